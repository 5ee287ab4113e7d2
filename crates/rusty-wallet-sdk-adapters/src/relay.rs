use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rusty_wallet_sdk_core::validation::parse_chain_id_str;
use rusty_wallet_sdk_core::{
    JsonRpcRequest, JsonRpcResponse, ProviderError, RelayChainUpdate, RelayConnectionPort,
    RelayEventSink, RelayFrame, WalletLinkRelayPort, WalletLinkSessionInfo, Web3Request,
    Web3Response,
};

use crate::correlator::RequestCorrelator;
use crate::crypto::{decrypt_with_session_key, encrypt_with_session_key};
use crate::session::WalletLinkSession;
use crate::storage::ScopedStorage;

const PUBLISH_EVENT: &str = "publishEvent";

struct RelayShared {
    connection: Arc<dyn RelayConnectionPort>,
    storage: ScopedStorage,
    url: String,
    generation: AtomicU64,
    session: Mutex<Option<Arc<WalletLinkSession>>>,
    correlator: RequestCorrelator<Web3Response>,
    sink: Mutex<Option<Arc<dyn RelayEventSink>>>,
}

/// Client of the legacy pairing relay. Requests are encrypted with the
/// session key and correlated by JSON-RPC id.
pub struct WalletLinkRelay {
    shared: Arc<RelayShared>,
}

impl WalletLinkRelay {
    pub fn new(
        connection: Arc<dyn RelayConnectionPort>,
        storage: ScopedStorage,
        url: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(RelayShared {
                connection,
                storage,
                url: url.into(),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
                correlator: RequestCorrelator::new(),
                sink: Mutex::new(None),
            }),
        }
    }

    pub fn linked(&self) -> Result<bool, ProviderError> {
        Ok(self
            .shared
            .current_session()?
            .is_some_and(|session| session.linked()))
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// Loads or creates the session and opens the relay connection once.
    fn ensure_connected(&self) -> Result<Arc<WalletLinkSession>, ProviderError> {
        let mut g = self.shared.lock_session()?;
        if let Some(session) = g.as_ref() {
            return Ok(Arc::clone(session));
        }
        let session = match WalletLinkSession::load(self.shared.storage.clone())? {
            Some(session) => session,
            None => {
                let session = WalletLinkSession::create(self.shared.storage.clone())?;
                session.save()?;
                session
            }
        };
        let session = Arc::new(session);
        let inbound = self.shared.connection.open(&self.shared.url, session.id())?;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(url = %self.shared.url, linked = session.linked(), "relay connection opened");
        tokio::spawn(pump(Arc::clone(&self.shared), inbound, generation));
        *g = Some(Arc::clone(&session));
        Ok(session)
    }
}

#[async_trait]
impl WalletLinkRelayPort for WalletLinkRelay {
    fn session(&self) -> Result<WalletLinkSessionInfo, ProviderError> {
        Ok(self.ensure_connected()?.info())
    }

    fn set_event_sink(&self, sink: Arc<dyn RelayEventSink>) {
        match self.shared.sink.lock() {
            Ok(mut g) => *g = Some(sink),
            Err(e) => warn!("relay sink lock poisoned: {e}"),
        }
    }

    async fn send_request(&self, request: Web3Request) -> Result<Web3Response, ProviderError> {
        let session = self.ensure_connected()?;
        let plaintext = serde_json::to_string(&request)
            .map_err(|e| ProviderError::Internal(format!("encode relay request failed: {e}")))?;
        let data = encrypt_with_session_key(&plaintext, session.key())?;
        let connection = Arc::clone(&self.shared.connection);
        let session_id = session.id().to_owned();
        self.shared
            .correlator
            .send(move |id| {
                let params = json!({
                    "sessionId": session_id,
                    "event": "Web3Request",
                    "data": data,
                });
                connection.send(&JsonRpcRequest::new(id, PUBLISH_EVENT, params))
            })
            .await
    }

    fn reset(&self) -> Result<(), ProviderError> {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.connection.close();
        self.shared.lock_session()?.take();
        let rejected = self
            .shared
            .correlator
            .reject_all(ProviderError::Disconnected("relay session reset".to_owned()));
        info!(rejected, "relay session reset");
        Ok(())
    }
}

impl RelayShared {
    fn lock_session(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<Arc<WalletLinkSession>>>, ProviderError> {
        self.session
            .lock()
            .map_err(|e| ProviderError::Internal(format!("relay session lock poisoned: {e}")))
    }

    fn current_session(&self) -> Result<Option<Arc<WalletLinkSession>>, ProviderError> {
        Ok(self.lock_session()?.clone())
    }

    fn sink(&self) -> Option<Arc<dyn RelayEventSink>> {
        self.sink.lock().ok().and_then(|g| g.clone())
    }

    fn handle_response(&self, response: JsonRpcResponse, key: &str) {
        let Some(id) = response_id(&response.id) else {
            debug!("relay response without a usable id");
            return;
        };
        let outcome = match (response.error, response.result) {
            (Some(error), _) => Err(ProviderError::from_backend(Some(error.code), &error.message)),
            (None, Some(result)) => decrypt_payload(&result, key),
            (None, None) => Err(ProviderError::Internal("empty relay response".to_owned())),
        };
        if !self.correlator.resolve(id, outcome) {
            debug!(id, "relay response for unknown request dropped");
        }
    }

    fn handle_notification(
        &self,
        session: &WalletLinkSession,
        method: &str,
        params: &Value,
    ) -> Result<(), ProviderError> {
        match method {
            "sessionLinked" => {
                info!("relay session linked");
                session.set_linked(true)
            }
            "accountsChanged" => {
                let accounts: Vec<Address> = decrypt_payload(params, session.key())?;
                if let Some(sink) = self.sink() {
                    sink.on_accounts(accounts);
                }
                Ok(())
            }
            "chainChanged" => {
                let update: RelayChainUpdate = decrypt_payload(params, session.key())?;
                let chain_id = parse_chain_id_str(&update.chain_id)?;
                if let Some(sink) = self.sink() {
                    sink.on_chain(chain_id, update.json_rpc_url);
                }
                Ok(())
            }
            other => {
                debug!(method = other, "ignoring relay notification");
                Ok(())
            }
        }
    }
}

fn response_id(raw: &Value) -> Option<u64> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn decrypt_payload<T: serde::de::DeserializeOwned>(
    container: &Value,
    key: &str,
) -> Result<T, ProviderError> {
    let cipher_hex = container
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Internal("relay payload has no data".to_owned()))?;
    let plaintext = decrypt_with_session_key(cipher_hex, key)?;
    serde_json::from_str(&plaintext)
        .map_err(|e| ProviderError::Internal(format!("malformed relay payload: {e}")))
}

async fn pump(
    shared: Arc<RelayShared>,
    mut inbound: mpsc::UnboundedReceiver<RelayFrame>,
    generation: u64,
) {
    while let Some(frame) = inbound.recv().await {
        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let session = match shared.current_session() {
            Ok(Some(session)) => session,
            _ => return,
        };
        match frame {
            RelayFrame::Response(response) => shared.handle_response(response, session.key()),
            RelayFrame::Notification { method, params } => {
                if let Err(e) = shared.handle_notification(&session, &method, &params) {
                    warn!(method = %method, "relay notification dropped: {e}");
                }
            }
        }
    }
    if shared.generation.load(Ordering::SeqCst) == generation {
        if let Ok(mut g) = shared.session.lock() {
            g.take();
        }
        let rejected = shared
            .correlator
            .reject_all(ProviderError::Disconnected("relay connection closed".to_owned()));
        warn!(rejected, "relay connection closed");
    }
}
