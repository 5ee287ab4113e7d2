use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use rusty_wallet_sdk_core::{
    AppMetadata, InboundMessage, MessageId, PopupConfig, PopupEvent, PopupGeometry, PopupMessage,
    PopupWindowPort, Preference, ProviderError, LIB_VERSION,
};

use crate::correlator::RequestCorrelator;
use crate::ProviderConfig;

pub(crate) const POPUP_CLOSED: &str = "Popup closed";

type Predicate = Box<dyn Fn(&PopupMessage) -> bool + Send>;
/// Returns `false` once its owner is gone; the transport then drops it.
pub type MessageHandler = Arc<dyn Fn(&PopupMessage) -> bool + Send + Sync>;

struct Listener {
    predicate: Predicate,
    responder: oneshot::Sender<Result<PopupMessage, ProviderError>>,
}

struct Shared {
    window: Arc<dyn PopupWindowPort>,
    origin: String,
    generation: AtomicU64,
    correlator: RequestCorrelator<PopupMessage>,
    listeners: Mutex<Vec<Listener>>,
    subscribers: Mutex<Vec<MessageHandler>>,
}

/// One-shot wait for the first inbound message matching a predicate.
pub struct PendingMessage {
    receiver: oneshot::Receiver<Result<PopupMessage, ProviderError>>,
}

impl PendingMessage {
    pub async fn wait(self) -> Result<PopupMessage, ProviderError> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(ProviderError::Disconnected(
                "popup listener dropped".to_owned(),
            ))
        })
    }
}

/// Message channel to the wallet popup window.
pub struct PopupTransport {
    url: Url,
    width: u32,
    height: u32,
    config: PopupConfig,
    connect_lock: tokio::sync::Mutex<()>,
    shared: Arc<Shared>,
}

impl PopupTransport {
    pub fn new(
        window: Arc<dyn PopupWindowPort>,
        config: &ProviderConfig,
        metadata: AppMetadata,
        preference: Preference,
        location: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let url = Url::parse(&config.keys_url)
            .map_err(|e| ProviderError::Internal(format!("invalid popup url: {e}")))?;
        let origin = url.origin().ascii_serialization();
        Ok(Self {
            url,
            width: config.popup_width,
            height: config.popup_height,
            config: PopupConfig {
                version: LIB_VERSION.to_owned(),
                metadata,
                preference,
                location: location.into(),
            },
            connect_lock: tokio::sync::Mutex::new(()),
            shared: Arc::new(Shared {
                window,
                origin,
                generation: AtomicU64::new(0),
                correlator: RequestCorrelator::new(),
                listeners: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn origin(&self) -> &str {
        &self.shared.origin
    }

    pub fn is_connected(&self) -> bool {
        self.shared.window.is_open()
    }

    /// Opens the popup (or focuses it when already open) and completes the
    /// `PopupLoaded` exchange.
    pub async fn connect(&self) -> Result<(), ProviderError> {
        let _guard = self.connect_lock.lock().await;
        if self.shared.window.is_open() {
            self.shared.window.focus();
            return Ok(());
        }

        let loaded = self.on_message(|m| m.event == PopupEvent::PopupLoaded)?;
        let geometry = PopupGeometry::centered(self.shared.window.viewport(), self.width, self.height);
        let inbound = self.shared.window.open(self.url.as_str(), geometry)?;
        self.shared.window.focus();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(url = %self.url, generation, "popup opened");
        tokio::spawn(pump(Arc::clone(&self.shared), inbound, generation));

        let loaded = loaded.wait().await?;
        let config = serde_json::to_value(&self.config)
            .map_err(|e| ProviderError::Internal(format!("encode popup config failed: {e}")))?;
        if let Some(id) = loaded.id {
            self.post_message(PopupMessage::response_to(id, config))?;
        }
        debug!("popup loaded");
        Ok(())
    }

    /// Fire-and-forget send; assigns an id when the message has none.
    pub fn post_message(&self, mut message: PopupMessage) -> Result<MessageId, ProviderError> {
        let id = match message.id {
            Some(id) => id,
            None => {
                let id = MessageId(self.shared.correlator.make_request_id());
                message.id = Some(id);
                id
            }
        };
        self.shared.post(&message)?;
        Ok(id)
    }

    pub fn on_message<F>(&self, predicate: F) -> Result<PendingMessage, ProviderError>
    where
        F: Fn(&PopupMessage) -> bool + Send + 'static,
    {
        let (responder, receiver) = oneshot::channel();
        let mut g = self
            .shared
            .listeners
            .lock()
            .map_err(|e| ProviderError::Internal(format!("popup listener lock poisoned: {e}")))?;
        g.push(Listener {
            predicate: Box::new(predicate),
            responder,
        });
        Ok(PendingMessage { receiver })
    }

    /// Registers a handler for every message not consumed by a pending request
    /// or one-shot listener.
    pub fn subscribe(&self, handler: MessageHandler) -> Result<(), ProviderError> {
        let mut g = self
            .shared
            .subscribers
            .lock()
            .map_err(|e| ProviderError::Internal(format!("popup subscriber lock poisoned: {e}")))?;
        g.push(handler);
        Ok(())
    }

    pub fn subscriber_count(&self) -> Result<usize, ProviderError> {
        Ok(self
            .shared
            .subscribers
            .lock()
            .map_err(|e| ProviderError::Internal(format!("popup subscriber lock poisoned: {e}")))?
            .len())
    }

    pub async fn post_request_and_wait_for_response(
        &self,
        mut message: PopupMessage,
    ) -> Result<PopupMessage, ProviderError> {
        self.connect().await?;
        let shared = Arc::clone(&self.shared);
        self.shared
            .correlator
            .send(move |id| {
                message.id = Some(MessageId(id));
                shared.post(&message)
            })
            .await
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    pub fn disconnect(&self) {
        self.shared.disconnect();
    }
}

impl Shared {
    fn post(&self, message: &PopupMessage) -> Result<(), ProviderError> {
        let value = serde_json::to_value(message)
            .map_err(|e| ProviderError::Internal(format!("encode popup message failed: {e}")))?;
        self.window.post_message(value, &self.origin)
    }

    fn dispatch(&self, raw: InboundMessage) {
        if raw.origin != self.origin || !raw.from_popup {
            debug!(origin = %raw.origin, "ignoring message from unexpected source");
            return;
        }
        let message: PopupMessage = match serde_json::from_value(raw.data) {
            Ok(message) => message,
            Err(e) => {
                debug!("ignoring malformed popup message: {e}");
                return;
            }
        };
        if message.event == PopupEvent::PopupUnload {
            info!("popup unloaded");
            self.disconnect();
            return;
        }
        if let Some(request_id) = message.request_id {
            if self.correlator.resolve(request_id.0, Ok(message.clone())) {
                return;
            }
        }
        if self.take_listener(&message) {
            return;
        }
        let subscribers: Vec<MessageHandler> = match self.subscribers.lock() {
            Ok(g) => g.clone(),
            Err(_) => return,
        };
        let dead: Vec<MessageHandler> = subscribers
            .into_iter()
            .filter(|handler| !handler(&message))
            .collect();
        if dead.is_empty() {
            return;
        }
        if let Ok(mut g) = self.subscribers.lock() {
            g.retain(|handler| !dead.iter().any(|d| Arc::ptr_eq(handler, d)));
            debug!(pruned = dead.len(), "dropped stale popup subscribers");
        }
    }

    fn take_listener(&self, message: &PopupMessage) -> bool {
        let listener = match self.listeners.lock() {
            Ok(mut g) => {
                g.retain(|l| !l.responder.is_closed());
                g.iter()
                    .position(|l| (l.predicate)(message))
                    .map(|idx| g.remove(idx))
            }
            Err(_) => None,
        };
        match listener {
            Some(listener) => {
                let _ = listener.responder.send(Ok(message.clone()));
                true
            }
            None => false,
        }
    }

    fn fail_listeners(&self, err: &ProviderError) {
        let drained: Vec<Listener> = match self.listeners.lock() {
            Ok(mut g) => g.drain(..).collect(),
            Err(_) => return,
        };
        for listener in drained {
            let _ = listener.responder.send(Err(err.clone()));
        }
    }

    fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.window.close();
        let err = ProviderError::Disconnected(POPUP_CLOSED.to_owned());
        let rejected = self.correlator.reject_all(err.clone());
        self.fail_listeners(&err);
        info!(rejected, "popup disconnected");
    }
}

async fn pump(
    shared: Arc<Shared>,
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    generation: u64,
) {
    while let Some(raw) = inbound.recv().await {
        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        shared.dispatch(raw);
    }
    if shared.generation.load(Ordering::SeqCst) == generation {
        warn!("popup channel closed");
        shared.disconnect();
    }
}
