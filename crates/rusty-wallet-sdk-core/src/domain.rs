use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// Arguments of a single EIP-1193 `request` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn without_params(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Validates an untyped argument value before it reaches any signer.
    pub fn from_value(raw: &Value) -> Result<Self, ProviderError> {
        let obj = raw.as_object().ok_or_else(|| {
            ProviderError::invalid_request(
                "Expected a single, non-array, object argument.",
                Some(raw.clone()),
            )
        })?;
        let method = match obj.get("method") {
            Some(Value::String(m)) if !m.is_empty() => m.clone(),
            _ => {
                return Err(ProviderError::invalid_request(
                    "'args.method' must be a non-empty string.",
                    Some(raw.clone()),
                ))
            }
        };
        let params = match obj.get("params") {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Array(_) | Value::Object(_))) => Some(p.clone()),
            Some(_) => {
                return Err(ProviderError::invalid_request(
                    "'args.params' must be an object or array if provided.",
                    Some(raw.clone()),
                ))
            }
        };
        Ok(Self { method, params })
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.method.is_empty() {
            return Err(ProviderError::invalid_request(
                "'args.method' must be a non-empty string.",
                None,
            ));
        }
        match &self.params {
            None | Some(Value::Array(_)) | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(ProviderError::invalid_request(
                "'args.params' must be an object or array if provided.",
                None,
            )),
        }
    }

    /// Params as a positional list; objects and absent params yield nothing.
    pub fn params_list(&self) -> &[Value] {
        match &self.params {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        }
    }

    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params_list().get(index)
    }

    pub fn params_or_empty(&self) -> Value {
        self.params.clone().unwrap_or_else(|| Value::Array(Vec::new()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl Chain {
    pub fn new(id: u64) -> Self {
        Self { id, rpc_url: None }
    }

    pub fn with_rpc_url(id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            id,
            rpc_url: Some(rpc_url.into()),
        }
    }

    pub fn hex_id(&self) -> String {
        format!("{:#x}", self.id)
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerType {
    #[serde(rename = "scw")]
    SmartContractWallet,
    #[serde(rename = "walletlink")]
    WalletLink,
    #[serde(rename = "extension")]
    Extension,
}

impl SignerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SmartContractWallet => "scw",
            Self::WalletLink => "walletlink",
            Self::Extension => "extension",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scw" => Some(Self::SmartContractWallet),
            "walletlink" => Some(Self::WalletLink),
            "extension" => Some(Self::Extension),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_logo_url: Option<String>,
    #[serde(default)]
    pub app_chain_ids: Vec<u64>,
}

impl AppMetadata {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_logo_url: None,
            app_chain_ids: Vec::new(),
        }
    }

    pub fn with_chain_ids(mut self, chain_ids: Vec<u64>) -> Self {
        self.app_chain_ids = chain_ids;
        self
    }

    pub fn default_chain(&self) -> Chain {
        Chain::new(self.app_chain_ids.first().copied().unwrap_or(1))
    }
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self::new("Dapp")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WalletOptions {
    #[default]
    All,
    SmartWalletOnly,
    EoaOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preference {
    pub options: WalletOptions,
}

impl Preference {
    pub fn smart_wallet_only() -> Self {
        Self {
            options: WalletOptions::SmartWalletOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    pub chain_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEventKind {
    Connect,
    Disconnect,
    AccountsChanged,
    ChainChanged,
    Message,
}

impl ProviderEventKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::AccountsChanged => "accountsChanged",
            Self::ChainChanged => "chainChanged",
            Self::Message => "message",
        }
    }
}

/// An event emitted to dapp listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub sequence: u64,
    pub kind: ProviderEventKind,
    pub value: Value,
}

pub fn format_address(address: &Address) -> String {
    alloy::hex::encode_prefixed(address.as_slice())
}

pub fn format_addresses(addresses: &[Address]) -> Vec<String> {
    addresses.iter().map(format_address).collect()
}

pub fn addresses_value(addresses: &[Address]) -> Value {
    Value::from(format_addresses(addresses))
}
