use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Requests understood by the legacy relay backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Web3Request {
    #[serde(rename_all = "camelCase")]
    RequestEthereumAccounts {
        app_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_logo_url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SignEthereumMessage {
        message: Bytes,
        address: Address,
        add_prefix: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        typed_data_json: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EthereumAddressFromSignedMessage {
        message: Bytes,
        signature: Bytes,
        add_prefix: bool,
    },
    #[serde(rename_all = "camelCase")]
    SignEthereumTransaction {
        #[serde(flatten)]
        tx: EthereumTransactionParams,
        should_submit: bool,
    },
    #[serde(rename_all = "camelCase")]
    SubmitEthereumTransaction {
        signed_transaction: Bytes,
        chain_id: u64,
    },
    #[serde(rename_all = "camelCase")]
    AddEthereumChain {
        chain_id: String,
        rpc_urls: Vec<String>,
        icon_urls: Vec<String>,
        block_explorer_urls: Vec<String>,
        chain_name: String,
        native_currency: Value,
    },
    #[serde(rename_all = "camelCase")]
    SwitchEthereumChain {
        chain_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<Address>,
    },
    #[serde(rename_all = "camelCase")]
    WatchAsset {
        #[serde(rename = "type")]
        asset_type: String,
        options: WatchAssetOptions,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain_id: Option<String>,
    },
}

impl Web3Request {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::RequestEthereumAccounts { .. } => "requestEthereumAccounts",
            Self::SignEthereumMessage { .. } => "signEthereumMessage",
            Self::EthereumAddressFromSignedMessage { .. } => "ethereumAddressFromSignedMessage",
            Self::SignEthereumTransaction { .. } => "signEthereumTransaction",
            Self::SubmitEthereumTransaction { .. } => "submitEthereumTransaction",
            Self::AddEthereumChain { .. } => "addEthereumChain",
            Self::SwitchEthereumChain { .. } => "switchEthereumChain",
            Self::WatchAsset { .. } => "watchAsset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchAssetOptions {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Web3Response {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
}

impl Web3Response {
    pub fn success(method: impl Into<String>, result: Value) -> Self {
        Self {
            method: method.into(),
            result: Some(result),
            error_message: None,
            error_code: None,
        }
    }

    pub fn failure(method: impl Into<String>, message: impl Into<String>, code: Option<i64>) -> Self {
        Self {
            method: method.into(),
            result: None,
            error_message: Some(message.into()),
            error_code: code,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Approval shape returned for chain add/switch requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainApproval {
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub rpc_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumTransactionParams {
    pub from_address: Address,
    pub to_address: Option<Address>,
    pub wei_value: U256,
    pub data: Bytes,
    pub nonce: Option<u64>,
    pub gas_price_in_wei: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub gas_limit: Option<U256>,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn jsonrpc_version() -> String {
    "2.0".to_owned()
}

/// Decrypted payload of a relay `chainChanged` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayChainUpdate {
    pub chain_id: String,
    pub json_rpc_url: String,
}

/// A frame delivered by the relay connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Response(JsonRpcResponse),
    Notification { method: String, params: Value },
}
