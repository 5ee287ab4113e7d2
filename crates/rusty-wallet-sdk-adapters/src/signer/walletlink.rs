use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use alloy::primitives::{Address, Bytes, U256};
use serde_json::{json, Value};
use tracing::{debug, info};

use rusty_wallet_sdk_core::standard_error_codes::provider::UNSUPPORTED_CHAIN;
use rusty_wallet_sdk_core::validation::{
    ensure_address, ensure_big_int, ensure_buffer, ensure_int_number, ensure_parsed_json_object,
    hex_string_from_int,
};
use rusty_wallet_sdk_core::{
    addresses_value, format_address, format_addresses, AppMetadata, Chain, ChainApproval,
    EthereumTransactionParams, ProviderError, RelayEventSink, RequestArguments, UpdateListener,
    WalletLinkRelayPort, WalletLinkSessionInfo, WatchAssetOptions, Web3Request, Web3Response,
};

use crate::eip712;
use crate::storage::ScopedStorage;

const ADDRESSES_KEY: &str = "Addresses";
const DEFAULT_CHAIN_ID_KEY: &str = "DefaultChainId";
const DEFAULT_JSON_RPC_URL_KEY: &str = "DefaultJsonRpcUrl";

const DENIED_ACCOUNTS: &str = "User denied account authorization";
const DENIED_MESSAGE: &str = "User denied message signature";
const DENIED_TRANSACTION: &str = "User denied transaction signature";

const ADD_CHAIN_ERROR_CODE: i64 = 2;

struct WalletLinkInner {
    metadata: AppMetadata,
    storage: ScopedStorage,
    relay: Arc<dyn WalletLinkRelayPort>,
    listener: Arc<dyn UpdateListener>,
    addresses: Mutex<Vec<Address>>,
    first_chain_emitted: AtomicBool,
}

impl WalletLinkInner {
    fn addresses(&self) -> Result<Vec<Address>, ProviderError> {
        self.addresses
            .lock()
            .map(|g| g.clone())
            .map_err(|e| ProviderError::Internal(format!("walletlink address lock poisoned: {e}")))
    }

    fn selected_address(&self) -> Result<Option<Address>, ProviderError> {
        Ok(self.addresses()?.first().copied())
    }

    fn chain_id(&self) -> Result<u64, ProviderError> {
        match self.storage.get_item(DEFAULT_CHAIN_ID_KEY)? {
            Some(raw) => raw.parse().map_err(|e| {
                ProviderError::Internal(format!("stored chain id {raw} is invalid: {e}"))
            }),
            None => Ok(1),
        }
    }

    fn json_rpc_url(&self) -> Result<String, ProviderError> {
        Ok(self
            .storage
            .get_item(DEFAULT_JSON_RPC_URL_KEY)?
            .unwrap_or_default())
    }

    fn current_chain(&self) -> Result<Chain, ProviderError> {
        let url = self.json_rpc_url()?;
        let id = self.chain_id()?;
        Ok(if url.is_empty() {
            Chain::new(id)
        } else {
            Chain::with_rpc_url(id, url)
        })
    }

    fn set_addresses(&self, addresses: Vec<Address>) -> Result<(), ProviderError> {
        {
            let mut g = self.addresses.lock().map_err(|e| {
                ProviderError::Internal(format!("walletlink address lock poisoned: {e}"))
            })?;
            if *g == addresses {
                return Ok(());
            }
            *g = addresses.clone();
        }
        self.storage
            .set_item(ADDRESSES_KEY, &format_addresses(&addresses).join(" "))?;
        self.listener.on_accounts_update(addresses);
        Ok(())
    }

    /// Records the wallet's chain; notifies on change and always on the first
    /// determination.
    fn update_provider_info(&self, json_rpc_url: &str, chain_id: u64) -> Result<(), ProviderError> {
        self.storage
            .set_item(DEFAULT_JSON_RPC_URL_KEY, json_rpc_url)?;
        let original = self.chain_id()?;
        self.storage
            .set_item(DEFAULT_CHAIN_ID_KEY, &chain_id.to_string())?;
        let first = !self.first_chain_emitted.swap(true, Ordering::SeqCst);
        if chain_id != original || first {
            debug!(chain_id, "walletlink chain updated");
            self.listener
                .on_chain_update(Chain::with_rpc_url(chain_id, json_rpc_url));
        }
        Ok(())
    }
}

struct RelaySink(Weak<WalletLinkInner>);

impl RelayEventSink for RelaySink {
    fn on_accounts(&self, accounts: Vec<Address>) {
        if let Some(inner) = self.0.upgrade() {
            if let Err(e) = inner.set_addresses(accounts) {
                debug!("failed to apply relay accounts: {e}");
            }
        }
    }

    fn on_chain(&self, chain_id: u64, json_rpc_url: String) {
        if let Some(inner) = self.0.upgrade() {
            if let Err(e) = inner.update_provider_info(&json_rpc_url, chain_id) {
                debug!("failed to apply relay chain: {e}");
            }
        }
    }
}

/// Signer for the legacy QR-pairing relay, with its own JSON-RPC method table.
pub struct WalletLinkSigner {
    inner: Arc<WalletLinkInner>,
}

impl WalletLinkSigner {
    pub fn new(
        metadata: AppMetadata,
        storage: ScopedStorage,
        relay: Arc<dyn WalletLinkRelayPort>,
        listener: Arc<dyn UpdateListener>,
    ) -> Result<Self, ProviderError> {
        let cached: Vec<Address> = match storage.get_item(ADDRESSES_KEY)? {
            Some(raw) if !raw.is_empty() => raw
                .split(' ')
                .map(|a| ensure_address(&Value::String(a.to_owned())))
                .collect::<Result<_, _>>()?,
            _ => Vec::new(),
        };
        let has_cached_chain = storage.get_item(DEFAULT_CHAIN_ID_KEY)?.is_some();

        let inner = Arc::new(WalletLinkInner {
            metadata,
            storage,
            relay,
            listener,
            addresses: Mutex::new(cached.clone()),
            first_chain_emitted: AtomicBool::new(false),
        });
        inner
            .relay
            .set_event_sink(Arc::new(RelaySink(Arc::downgrade(&inner))));

        if !cached.is_empty() {
            inner.listener.on_accounts_update(cached);
        }
        if has_cached_chain {
            inner.listener.on_chain_update(inner.current_chain()?);
            inner.first_chain_emitted.store(true, Ordering::SeqCst);
        }
        Ok(Self { inner })
    }

    pub fn session(&self) -> Result<WalletLinkSessionInfo, ProviderError> {
        self.inner.relay.session()
    }

    pub fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.inner.addresses()
    }

    pub async fn handshake(&self) -> Result<Vec<Address>, ProviderError> {
        let value = self
            .request(&RequestArguments::without_params("eth_requestAccounts"))
            .await?;
        super::parse_accounts(&value)
    }

    pub fn disconnect(&self) -> Result<(), ProviderError> {
        self.inner.relay.reset()?;
        self.inner
            .addresses
            .lock()
            .map_err(|e| ProviderError::Internal(format!("walletlink address lock poisoned: {e}")))?
            .clear();
        self.inner.first_chain_emitted.store(false, Ordering::SeqCst);
        info!("walletlink session reset");
        self.inner.storage.clear()
    }

    pub async fn request(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        args.validate()?;
        let params = args.params_list();
        match args.method.as_str() {
            "eth_accounts" => Ok(addresses_value(&self.inner.addresses()?)),
            "eth_coinbase" => Ok(match self.inner.selected_address()? {
                Some(address) => json!(format_address(&address)),
                None => Value::Null,
            }),
            "net_version" => Ok(json!(self.inner.chain_id()?.to_string())),
            "eth_chainId" => Ok(json!(hex_string_from_int(self.inner.chain_id()?))),

            "eth_requestAccounts" => self.eth_request_accounts().await,
            "eth_sign" => {
                self.require_authorization()?;
                let address = ensure_address(param(params, 0))?;
                let message = ensure_buffer(param(params, 1))?;
                self.sign_message(message, address, false, None).await
            }
            "eth_ecRecover" => self.ec_recover(params, false).await,
            "personal_sign" => {
                self.require_authorization()?;
                let message = ensure_buffer(param(params, 0))?;
                let address = ensure_address(param(params, 1))?;
                self.sign_message(message, address, true, None).await
            }
            "personal_ecRecover" => self.ec_recover(params, true).await,
            "eth_signTransaction" => self.sign_transaction(params, false).await,
            "eth_sendTransaction" => self.sign_transaction(params, true).await,
            "eth_sendRawTransaction" => {
                let signed_transaction = ensure_buffer(param(params, 0))?;
                let chain_id = self.inner.chain_id()?;
                let response = self
                    .send(Web3Request::SubmitEthereumTransaction {
                        signed_transaction,
                        chain_id,
                    })
                    .await?;
                result_or_error(response)
            }
            "eth_signTypedData_v1" => {
                self.require_authorization()?;
                let typed_data = ensure_parsed_json_object(param(params, 0))?;
                let address = ensure_address(param(params, 1))?;
                self.sign_typed_data(address, typed_data, eip712::hash_legacy)
                    .await
            }
            "eth_signTypedData_v3" => {
                self.require_authorization()?;
                let address = ensure_address(param(params, 0))?;
                let typed_data = ensure_parsed_json_object(param(params, 1))?;
                self.sign_typed_data(address, typed_data, eip712::hash_v3)
                    .await
            }
            "eth_signTypedData_v4" | "eth_signTypedData" => {
                self.require_authorization()?;
                let address = ensure_address(param(params, 0))?;
                let typed_data = ensure_parsed_json_object(param(params, 1))?;
                self.sign_typed_data(address, typed_data, eip712::hash_v4)
                    .await
            }
            "wallet_addEthereumChain" => self.add_ethereum_chain(params).await,
            "wallet_switchEthereumChain" => self.switch_ethereum_chain(params).await,
            "wallet_watchAsset" => {
                let request = match &args.params {
                    Some(Value::Array(items)) => items.first().cloned().unwrap_or(Value::Null),
                    Some(other) => other.clone(),
                    None => Value::Null,
                };
                self.watch_asset(&request).await
            }
            other => Err(ProviderError::UnsupportedMethod(other.to_owned())),
        }
    }

    fn require_authorization(&self) -> Result<(), ProviderError> {
        if self.inner.addresses()?.is_empty() {
            return Err(ProviderError::unauthorized());
        }
        Ok(())
    }

    fn ensure_known_address(&self, address: &Address) -> Result<(), ProviderError> {
        if self.inner.addresses()?.contains(address) {
            Ok(())
        } else {
            Err(ProviderError::UnknownAddress(format_address(address)))
        }
    }

    async fn send(&self, request: Web3Request) -> Result<Web3Response, ProviderError> {
        debug!(method = request.method_name(), "walletlink relay request");
        self.inner.relay.send_request(request).await
    }

    async fn eth_request_accounts(&self) -> Result<Value, ProviderError> {
        let cached = self.inner.addresses()?;
        if !cached.is_empty() {
            return Ok(addresses_value(&cached));
        }
        let response = self
            .send(Web3Request::RequestEthereumAccounts {
                app_name: self.inner.metadata.app_name.clone(),
                app_logo_url: self.inner.metadata.app_logo_url.clone(),
            })
            .await
            .map_err(|e| with_rejection(e, DENIED_ACCOUNTS))?;
        let result = result_or_error(response).map_err(|e| with_rejection(e, DENIED_ACCOUNTS))?;
        let accounts = super::parse_accounts(&result)?;
        if accounts.is_empty() {
            return Err(ProviderError::Internal(
                "accounts received is empty".to_owned(),
            ));
        }
        self.inner.set_addresses(accounts)?;
        Ok(addresses_value(&self.inner.addresses()?))
    }

    async fn sign_message(
        &self,
        message: Bytes,
        address: Address,
        add_prefix: bool,
        typed_data_json: Option<String>,
    ) -> Result<Value, ProviderError> {
        self.ensure_known_address(&address)?;
        let response = self
            .send(Web3Request::SignEthereumMessage {
                message,
                address,
                add_prefix,
                typed_data_json,
            })
            .await
            .map_err(|e| with_rejection(e, DENIED_MESSAGE))?;
        result_or_error(response).map_err(|e| with_rejection(e, DENIED_MESSAGE))
    }

    async fn ec_recover(&self, params: &[Value], add_prefix: bool) -> Result<Value, ProviderError> {
        let message = ensure_buffer(param(params, 0))?;
        let signature = ensure_buffer(param(params, 1))?;
        let response = self
            .send(Web3Request::EthereumAddressFromSignedMessage {
                message,
                signature,
                add_prefix,
            })
            .await?;
        result_or_error(response)
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: Value,
        hash: fn(&Value) -> Result<alloy::primitives::B256, ProviderError>,
    ) -> Result<Value, ProviderError> {
        self.ensure_known_address(&address)?;
        let digest = hash(&typed_data)?;
        let typed_data_json = serde_json::to_string_pretty(&typed_data)
            .map_err(|e| ProviderError::Internal(format!("encode typed data failed: {e}")))?;
        self.sign_message(
            Bytes::copy_from_slice(digest.as_slice()),
            address,
            false,
            Some(typed_data_json),
        )
        .await
    }

    async fn sign_transaction(
        &self,
        params: &[Value],
        should_submit: bool,
    ) -> Result<Value, ProviderError> {
        self.require_authorization()?;
        let tx = self.prepare_transaction(params.first().unwrap_or(&Value::Null))?;
        let response = self
            .send(Web3Request::SignEthereumTransaction { tx, should_submit })
            .await
            .map_err(|e| with_rejection(e, DENIED_TRANSACTION))?;
        result_or_error(response).map_err(|e| with_rejection(e, DENIED_TRANSACTION))
    }

    fn prepare_transaction(&self, tx: &Value) -> Result<EthereumTransactionParams, ProviderError> {
        let field = |name: &str| tx.get(name).filter(|v| !v.is_null());
        let from_address = match field("from") {
            Some(from) => ensure_address(from)?,
            None => self.inner.selected_address()?.ok_or_else(|| {
                ProviderError::Internal("Ethereum address is unavailable".to_owned())
            })?,
        };
        self.ensure_known_address(&from_address)?;
        let to_address = field("to").map(ensure_address).transpose()?;
        let wei_value = match field("value") {
            Some(v) => ensure_big_int(v)?,
            None => U256::ZERO,
        };
        let data = match field("data") {
            Some(v) => ensure_buffer(v)?,
            None => Bytes::new(),
        };
        let chain_id = match field("chainId") {
            Some(v) => ensure_int_number(v)?,
            None => self.inner.chain_id()?,
        };
        Ok(EthereumTransactionParams {
            from_address,
            to_address,
            wei_value,
            data,
            nonce: field("nonce").map(ensure_int_number).transpose()?,
            gas_price_in_wei: field("gasPrice").map(ensure_big_int).transpose()?,
            max_fee_per_gas: field("maxFeePerGas").map(ensure_big_int).transpose()?,
            max_priority_fee_per_gas: field("maxPriorityFeePerGas")
                .map(ensure_big_int)
                .transpose()?,
            gas_limit: field("gas").map(ensure_big_int).transpose()?,
            chain_id,
        })
    }

    async fn add_ethereum_chain(&self, params: &[Value]) -> Result<Value, ProviderError> {
        let request = param(params, 0);
        let rpc_urls = string_list(request.get("rpcUrls"));
        if request.get("rpcUrls").is_some() && rpc_urls.is_empty() {
            return Err(add_chain_error("please pass in at least 1 rpcUrl"));
        }
        let chain_name = request
            .get("chainName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::InvalidParams("chainName is a required field".to_owned()))?
            .to_owned();
        let native_currency = request
            .get("nativeCurrency")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                ProviderError::InvalidParams("nativeCurrency is a required field".to_owned())
            })?;
        let chain_id = request
            .get("chainId")
            .and_then(Value::as_str)
            .and_then(|raw| u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| ProviderError::InvalidParams("chainId is a required field".to_owned()))?;

        if chain_id == self.inner.chain_id()? {
            return Err(add_chain_error("unable to add ethereum chain"));
        }
        if self.inner.addresses()?.is_empty() {
            self.eth_request_accounts().await?;
        }
        let response = self
            .send(Web3Request::AddEthereumChain {
                chain_id: chain_id.to_string(),
                rpc_urls: rpc_urls.clone(),
                icon_urls: string_list(request.get("iconUrls")),
                block_explorer_urls: string_list(request.get("blockExplorerUrls")),
                chain_name,
                native_currency,
            })
            .await?;
        if response.is_error() {
            return Err(add_chain_error("unable to add ethereum chain"));
        }
        let approval = approval_from(response.result);
        if !approval.is_approved {
            return Err(add_chain_error("unable to add ethereum chain"));
        }
        if let Some(url) = rpc_urls.first() {
            self.inner.update_provider_info(url, chain_id)?;
        }
        Ok(Value::Null)
    }

    async fn switch_ethereum_chain(&self, params: &[Value]) -> Result<Value, ProviderError> {
        let chain_id = param(params, 0)
            .get("chainId")
            .and_then(Value::as_str)
            .and_then(|raw| u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| ProviderError::InvalidParams("chainId is a required field".to_owned()))?;
        let response = self
            .send(Web3Request::SwitchEthereumChain {
                chain_id: chain_id.to_string(),
                address: self.inner.selected_address()?,
            })
            .await?;
        if response.is_error() {
            return match response.error_code {
                None => Ok(Value::Null),
                Some(UNSUPPORTED_CHAIN) => Err(ProviderError::UnsupportedChain),
                Some(code) => Err(ProviderError::Custom {
                    code,
                    message: response.error_message.unwrap_or_default(),
                }),
            };
        }
        let approval = approval_from(response.result);
        if approval.is_approved && !approval.rpc_url.is_empty() {
            self.inner
                .update_provider_info(&approval.rpc_url, chain_id)?;
        }
        Ok(Value::Null)
    }

    async fn watch_asset(&self, request: &Value) -> Result<Value, ProviderError> {
        let asset_type = request
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::InvalidParams("Type is required".to_owned()))?;
        if asset_type != "ERC20" {
            return Err(ProviderError::InvalidParams(format!(
                "Asset of type '{asset_type}' is not supported"
            )));
        }
        let options = request
            .get("options")
            .filter(|v| v.is_object())
            .ok_or_else(|| ProviderError::InvalidParams("Options are required".to_owned()))?;
        let address = options
            .get("address")
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ProviderError::InvalidParams("Address is required".to_owned()))?;

        let response = self
            .send(Web3Request::WatchAsset {
                asset_type: asset_type.to_owned(),
                options: WatchAssetOptions {
                    address: address.to_owned(),
                    symbol: options
                        .get("symbol")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    decimals: options
                        .get("decimals")
                        .and_then(Value::as_u64)
                        .and_then(|d| u32::try_from(d).ok()),
                    image: options
                        .get("image")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                },
                chain_id: Some(self.inner.chain_id()?.to_string()),
            })
            .await?;
        if response.is_error() {
            return Ok(json!(false));
        }
        Ok(json!(response.result.as_ref().is_some_and(truthy)))
    }
}

fn param(params: &[Value], index: usize) -> &Value {
    params.get(index).unwrap_or(&Value::Null)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn approval_from(result: Option<Value>) -> ChainApproval {
    result
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn add_chain_error(message: &str) -> ProviderError {
    ProviderError::Custom {
        code: ADD_CHAIN_ERROR_CODE,
        message: message.to_owned(),
    }
}

fn result_or_error(response: Web3Response) -> Result<Value, ProviderError> {
    if let Some(message) = response.error_message {
        return Err(ProviderError::from_backend(response.error_code, &message));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

fn with_rejection(err: ProviderError, rejection_message: &str) -> ProviderError {
    match super::normalize_rejection(err) {
        ProviderError::UserRejected(_) => ProviderError::UserRejected(rejection_message.to_owned()),
        other => other,
    }
}
