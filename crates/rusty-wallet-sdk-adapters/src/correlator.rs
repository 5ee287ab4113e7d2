use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use rusty_wallet_sdk_core::ProviderError;

type Outcome<T> = Result<T, ProviderError>;

struct PendingRequest<T> {
    created_at: Instant,
    responder: oneshot::Sender<Outcome<T>>,
}

/// Matches responses to in-flight requests by id, in any arrival order.
pub struct RequestCorrelator<T> {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest<T>>>,
}

/// Handle awaiting the response registered under `id`.
pub struct PendingResponse<T> {
    pub id: u64,
    receiver: oneshot::Receiver<Outcome<T>>,
}

impl<T> PendingResponse<T> {
    pub async fn wait(self) -> Outcome<T> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(ProviderError::Disconnected(
                "request dropped before a response arrived".to_owned(),
            ))
        })
    }
}

impl<T> Default for RequestCorrelator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestCorrelator<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn make_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn register(&self, id: u64) -> Result<PendingResponse<T>, ProviderError> {
        let mut g = self
            .pending
            .lock()
            .map_err(|e| ProviderError::Internal(format!("correlator lock poisoned: {e}")))?;
        if g.contains_key(&id) {
            return Err(ProviderError::Internal(format!(
                "request id {id} is already pending"
            )));
        }
        let (responder, receiver) = oneshot::channel();
        g.insert(
            id,
            PendingRequest {
                created_at: Instant::now(),
                responder,
            },
        );
        Ok(PendingResponse { id, receiver })
    }

    /// Registers a fresh id, hands it to `transmit`, then awaits the response.
    pub async fn send<F>(&self, transmit: F) -> Outcome<T>
    where
        F: FnOnce(u64) -> Result<(), ProviderError>,
    {
        let id = self.make_request_id();
        let pending = self.register(id)?;
        if let Err(err) = transmit(id) {
            self.forget(id);
            return Err(err);
        }
        pending.wait().await
    }

    /// Delivers `result` to the request registered under `id`.
    ///
    /// Returns `false` for unknown or already-resolved ids.
    pub fn resolve(&self, id: u64, result: Outcome<T>) -> bool {
        let entry = match self.pending.lock() {
            Ok(mut g) => g.remove(&id),
            Err(e) => {
                debug!(id, "correlator lock poisoned on resolve: {e}");
                return false;
            }
        };
        match entry {
            Some(entry) => {
                debug!(
                    id,
                    elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                    "correlated response"
                );
                // A dropped receiver means the caller stopped waiting.
                let _ = entry.responder.send(result);
                true
            }
            None => {
                debug!(id, "dropping response for unknown request id");
                false
            }
        }
    }

    pub fn forget(&self, id: u64) {
        if let Ok(mut g) = self.pending.lock() {
            g.remove(&id);
        }
    }

    /// Fails every pending request with `err`; returns how many were pending.
    pub fn reject_all(&self, err: ProviderError) -> usize {
        let drained: Vec<PendingRequest<T>> = match self.pending.lock() {
            Ok(mut g) => g.drain().map(|(_, v)| v).collect(),
            Err(_) => return 0,
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.responder.send(Err(err.clone()));
        }
        if count > 0 {
            debug!(count, "rejected pending requests");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|g| g.len()).unwrap_or(0)
    }
}
