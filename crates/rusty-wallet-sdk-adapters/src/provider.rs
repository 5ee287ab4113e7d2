use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use rusty_wallet_sdk_core::{
    addresses_value, determine_method_category, format_address, is_filter_method, AppMetadata,
    Chain, ConnectInfo, InjectedProviderPort, MethodCategory, PopupWindowPort, Preference,
    ProviderError, ProviderEvent, ProviderEventKind, ProviderState, RelayConnectionPort,
    RequestArguments, RpcTransportPort, SerializedError, SignerType, StateTransition, StoragePort,
    UpdateListener, WalletLinkRelayPort,
};

use crate::filter::{FilterPolyfill, FilterResponse};
use crate::popup::PopupTransport;
use crate::rpc::{ChainRpc, ChainSource, HttpRpcClient, RpcFetch};
use crate::signer::{Signer, SignerFactory, SignerRegistry};
use crate::storage::ScopedStorage;
use crate::ProviderConfig;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Collaborators and settings a provider is built from.
pub struct ProviderOptions {
    pub metadata: AppMetadata,
    pub preference: Preference,
    pub config: ProviderConfig,
    pub storage: Arc<dyn StoragePort>,
    pub popup: Arc<dyn PopupWindowPort>,
    pub injected: Option<Arc<dyn InjectedProviderPort>>,
    pub walletlink_relay: Option<Arc<dyn WalletLinkRelayPort>>,
    pub relay_connection: Option<Arc<dyn RelayConnectionPort>>,
    pub rpc: Option<Arc<dyn RpcTransportPort>>,
    pub location: String,
}

impl ProviderOptions {
    pub fn new(
        metadata: AppMetadata,
        storage: Arc<dyn StoragePort>,
        popup: Arc<dyn PopupWindowPort>,
    ) -> Self {
        Self {
            metadata,
            preference: Preference::default(),
            config: ProviderConfig::default(),
            storage,
            popup,
            injected: None,
            walletlink_relay: None,
            relay_connection: None,
            rpc: None,
            location: String::new(),
        }
    }
}

#[derive(Default)]
struct EventLog {
    seq: u64,
    events: Vec<ProviderEvent>,
}

/// Account/chain cache plus event recording, shared with the signers as
/// their update listener.
struct ProviderShared {
    state: Mutex<ProviderState>,
    events: Mutex<EventLog>,
    sender: broadcast::Sender<ProviderEvent>,
}

impl ProviderShared {
    fn new(chain: Chain) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ProviderState::new(chain)),
            events: Mutex::new(EventLog::default()),
            sender,
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ProviderState>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Internal(format!("provider lock poisoned: {e}")))
    }

    fn snapshot(&self) -> Result<ProviderState, ProviderError> {
        Ok(self.lock_state()?.clone())
    }

    fn record(&self, kind: ProviderEventKind, value: Value) -> Result<(), ProviderError> {
        let event = {
            let mut g = self
                .events
                .lock()
                .map_err(|e| ProviderError::Internal(format!("event log lock poisoned: {e}")))?;
            g.seq = g.seq.saturating_add(1);
            let event = ProviderEvent {
                sequence: g.seq,
                kind,
                value,
            };
            g.events.push(event.clone());
            event
        };
        debug!(event = kind.event_name(), sequence = event.sequence, "provider event");
        let _ = self.sender.send(event);
        Ok(())
    }

    fn apply(&self, transition: Result<Option<StateTransition>, ProviderError>) {
        let result = transition.and_then(|t| match t {
            Some(t) => self.record(t.kind, t.value),
            None => Ok(()),
        });
        if let Err(e) = result {
            warn!("dropping state update: {e}");
        }
    }
}

impl UpdateListener for ProviderShared {
    fn on_accounts_update(&self, accounts: Vec<Address>) {
        self.apply(self.lock_state().map(|mut g| g.apply_accounts(accounts)));
    }

    fn on_chain_update(&self, chain: Chain) {
        self.apply(self.lock_state().map(|mut g| g.apply_chain(chain)));
    }

    fn on_message(&self, kind: &str, data: Value) {
        if let Err(e) = self.record(ProviderEventKind::Message, json!({ "type": kind, "data": data })) {
            warn!("dropping provider message: {e}");
        }
    }
}

impl ChainSource for ProviderShared {
    fn current_chain(&self) -> Result<Chain, ProviderError> {
        Ok(self.lock_state()?.chain.clone())
    }
}

/// The EIP-1193 surface a dapp talks to.
pub struct WalletProvider {
    shared: Arc<ProviderShared>,
    registry: Arc<SignerRegistry>,
    signer: Mutex<Option<Arc<Signer>>>,
    preference: Preference,
    storage: Arc<dyn StoragePort>,
    rpc: Arc<dyn RpcFetch>,
    filters: FilterPolyfill,
    docs_url: String,
}

impl WalletProvider {
    pub fn new(options: ProviderOptions) -> Result<Self, ProviderError> {
        let ProviderOptions {
            metadata,
            preference,
            config,
            storage,
            popup,
            injected,
            walletlink_relay,
            relay_connection,
            rpc,
            location,
        } = options;

        let shared = Arc::new(ProviderShared::new(metadata.default_chain()));
        let transport = Arc::new(PopupTransport::new(
            popup,
            &config,
            metadata.clone(),
            preference.clone(),
            location,
        )?);
        let factory = SignerFactory {
            metadata,
            config: config.clone(),
            storage: Arc::clone(&storage),
            transport,
            listener: Arc::clone(&shared) as Arc<dyn UpdateListener>,
            injected,
            walletlink_relay,
            relay_connection,
        };
        let registry = Arc::new(SignerRegistry::new(factory));
        let signer = match registry.load() {
            Ok(signer) => signer,
            Err(e) => {
                warn!("failed to restore persisted signer: {e}");
                None
            }
        };

        let transport: Arc<dyn RpcTransportPort> = match rpc {
            Some(rpc) => rpc,
            None => Arc::new(HttpRpcClient::new(&config)?),
        };
        let rpc: Arc<dyn RpcFetch> = Arc::new(ChainRpc::new(
            transport,
            Arc::clone(&shared) as Arc<dyn ChainSource>,
        ));
        let filters = FilterPolyfill::new(
            Arc::clone(&rpc),
            Duration::from_millis(config.filter_timeout_ms),
            Duration::from_millis(config.block_height_throttle_ms),
        );

        Ok(Self {
            shared,
            registry,
            signer: Mutex::new(signer),
            preference,
            storage,
            rpc,
            filters,
            docs_url: config.error_docs_url,
        })
    }

    pub fn connected(&self) -> Result<bool, ProviderError> {
        Ok(self.shared.snapshot()?.connected())
    }

    pub fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.shared.snapshot()?.accounts)
    }

    pub fn chain(&self) -> Result<Chain, ProviderError> {
        Ok(self.shared.snapshot()?.chain)
    }

    pub fn signer_type(&self) -> Result<Option<SignerType>, ProviderError> {
        Ok(self.current_signer()?.map(|s| s.signer_type()))
    }

    pub fn registry(&self) -> &Arc<SignerRegistry> {
        &self.registry
    }

    /// Recorded events since the last drain, in emission order.
    pub fn drain_events(&self) -> Result<Vec<ProviderEvent>, ProviderError> {
        let mut g = self
            .shared
            .events
            .lock()
            .map_err(|e| ProviderError::Internal(format!("event log lock poisoned: {e}")))?;
        Ok(std::mem::take(&mut g.events))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.shared.sender.subscribe()
    }

    pub async fn request(&self, args: &RequestArguments) -> Result<Value, SerializedError> {
        match self.dispatch(args).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(e, Some(&args.method)).await),
        }
    }

    /// Entry point for untyped input; shape validation happens before any
    /// signer is touched.
    pub async fn request_value(&self, raw: &Value) -> Result<Value, SerializedError> {
        match RequestArguments::from_value(raw) {
            Ok(args) => self.request(&args).await,
            Err(e) => {
                let method = raw.get("method").and_then(Value::as_str);
                Err(self.fail(e, method).await)
            }
        }
    }

    #[deprecated(note = "use request with eth_requestAccounts")]
    pub async fn enable(&self) -> Result<Value, SerializedError> {
        warn!(".enable() has been deprecated. Please use .request({{ method: \"eth_requestAccounts\" }}) instead.");
        self.request(&RequestArguments::without_params("eth_requestAccounts"))
            .await
    }

    pub async fn disconnect(&self) -> Result<(), ProviderError> {
        self.shared.lock_state()?.reset();
        let signer = self
            .signer
            .lock()
            .map_err(|e| ProviderError::Internal(format!("signer lock poisoned: {e}")))?
            .take();
        if let Some(signer) = signer {
            if let Err(e) = signer.disconnect().await {
                warn!("signer disconnect failed: {e}");
            }
        }
        self.registry.clear()?;
        let removed = ScopedStorage::clear_all(self.storage.as_ref())?;
        info!(removed, "provider disconnected");
        let reason = ProviderError::Disconnected("User initiated disconnection".to_owned());
        let payload = serde_json::to_value(SerializedError::new(&reason, None, &self.docs_url))
            .map_err(|e| ProviderError::Internal(format!("encode disconnect event failed: {e}")))?;
        self.shared.record(ProviderEventKind::Disconnect, payload)
    }

    async fn fail(&self, error: ProviderError, method: Option<&str>) -> SerializedError {
        if error.is_unauthorized() {
            if let Err(e) = self.disconnect().await {
                warn!("disconnect after unauthorized error failed: {e}");
            }
        }
        SerializedError::new(&error, method, &self.docs_url)
    }

    fn current_signer(&self) -> Result<Option<Arc<Signer>>, ProviderError> {
        Ok(self
            .signer
            .lock()
            .map_err(|e| ProviderError::Internal(format!("signer lock poisoned: {e}")))?
            .clone())
    }

    async fn dispatch(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        args.validate()?;
        match determine_method_category(&args.method) {
            MethodCategory::Handshake => self.handshake().await,
            MethodCategory::Sign => {
                let signer = match self.current_signer()? {
                    Some(signer) if self.shared.snapshot()?.connected() => signer,
                    _ => return Err(ProviderError::unauthorized()),
                };
                signer.request(args).await
            }
            MethodCategory::Fetch => self.fetch(args).await,
            MethodCategory::State => self.state_request(args),
            MethodCategory::Deprecated => Err(ProviderError::MethodNotSupported(format!(
                "Method {} is deprecated.",
                args.method
            ))),
            MethodCategory::Unsupported => Err(ProviderError::MethodNotSupported(format!(
                "Method {} is not supported.",
                args.method
            ))),
        }
    }

    async fn handshake(&self) -> Result<Value, ProviderError> {
        let state = self.shared.snapshot()?;
        if state.connected() {
            self.emit_connect(&state.chain)?;
            return Ok(addresses_value(&state.accounts));
        }

        let signer_type = self.registry.select(&self.preference).await?;
        let signer = self.registry.get(signer_type)?;
        info!(signer = signer_type.as_str(), "handshake started");
        let accounts = signer.handshake().await?;
        *self
            .signer
            .lock()
            .map_err(|e| ProviderError::Internal(format!("signer lock poisoned: {e}")))? =
            Some(signer);
        self.registry.store(signer_type)?;
        info!(signer = signer_type.as_str(), count = accounts.len(), "handshake complete");
        self.emit_connect(&self.shared.snapshot()?.chain)?;
        Ok(addresses_value(&accounts))
    }

    fn emit_connect(&self, chain: &Chain) -> Result<(), ProviderError> {
        let info = ConnectInfo {
            chain_id: chain.hex_id(),
        };
        let value = serde_json::to_value(info)
            .map_err(|e| ProviderError::Internal(format!("encode connect event failed: {e}")))?;
        self.shared.record(ProviderEventKind::Connect, value)
    }

    fn state_request(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        let state = self.shared.snapshot()?;
        let connected_accounts = || {
            if state.connected() {
                Ok(state.accounts.clone())
            } else {
                Err(ProviderError::unauthorized())
            }
        };
        match args.method.as_str() {
            "eth_chainId" => Ok(json!(state.chain.hex_id())),
            "net_version" => Ok(json!(state.chain.id)),
            "eth_accounts" => Ok(addresses_value(&connected_accounts()?)),
            "eth_coinbase" => Ok(connected_accounts()?
                .first()
                .map(|a| json!(format_address(a)))
                .unwrap_or(Value::Null)),
            other => Err(ProviderError::MethodNotSupported(format!(
                "Method {other} is not supported."
            ))),
        }
    }

    async fn fetch(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        if is_filter_method(&args.method) {
            return match self.filters.request(&args.method, args.params_list()).await? {
                FilterResponse::Result(value) => Ok(value),
                FilterResponse::Error(_) => Err(ProviderError::FilterNotFound),
            };
        }
        self.rpc.fetch(&args.method, args.params_or_empty()).await
    }
}
