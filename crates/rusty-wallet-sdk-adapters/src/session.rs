use std::sync::atomic::{AtomicBool, Ordering};

use rusty_wallet_sdk_core::{ProviderError, WalletLinkSessionInfo};

use crate::crypto::{derive_session_key, random_bytes_hex};
use crate::storage::ScopedStorage;

const STORAGE_KEY_SESSION_ID: &str = "session:id";
const STORAGE_KEY_SESSION_SECRET: &str = "session:secret";
const STORAGE_KEY_SESSION_LINKED: &str = "session:linked";

/// Credentials of a legacy relay session.
#[derive(Debug)]
pub struct WalletLinkSession {
    storage: ScopedStorage,
    id: String,
    secret: String,
    key: String,
    linked: AtomicBool,
}

impl WalletLinkSession {
    /// Restores a persisted session; both id and secret must be present.
    pub fn load(storage: ScopedStorage) -> Result<Option<Self>, ProviderError> {
        let id = storage.get_item(STORAGE_KEY_SESSION_ID)?;
        let secret = storage.get_item(STORAGE_KEY_SESSION_SECRET)?;
        let linked = storage.get_item(STORAGE_KEY_SESSION_LINKED)?;
        match (id, secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                let session = Self::build(storage, id, secret, linked.as_deref() == Some("1"));
                Ok(Some(session))
            }
            _ => Ok(None),
        }
    }

    /// Fresh session with random credentials (16-byte id, 32-byte secret).
    pub fn create(storage: ScopedStorage) -> Result<Self, ProviderError> {
        Self::with_credentials(storage, None, None)
    }

    pub fn with_credentials(
        storage: ScopedStorage,
        id: Option<String>,
        secret: Option<String>,
    ) -> Result<Self, ProviderError> {
        let id = match id {
            Some(id) => id,
            None => random_bytes_hex::<16>()?,
        };
        let secret = match secret {
            Some(secret) => secret,
            None => random_bytes_hex::<32>()?,
        };
        Ok(Self::build(storage, id, secret, false))
    }

    fn build(storage: ScopedStorage, id: String, secret: String, linked: bool) -> Self {
        let key = derive_session_key(&id, &secret);
        Self {
            storage,
            id,
            secret,
            key,
            linked: AtomicBool::new(linked),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> WalletLinkSessionInfo {
        WalletLinkSessionInfo {
            id: self.id.clone(),
            secret: self.secret.clone(),
        }
    }

    pub fn set_linked(&self, linked: bool) -> Result<(), ProviderError> {
        self.linked.store(linked, Ordering::SeqCst);
        self.persist_linked()
    }

    pub fn save(&self) -> Result<(), ProviderError> {
        self.storage.set_item(STORAGE_KEY_SESSION_ID, &self.id)?;
        self.storage.set_item(STORAGE_KEY_SESSION_SECRET, &self.secret)?;
        self.persist_linked()
    }

    fn persist_linked(&self) -> Result<(), ProviderError> {
        let flag = if self.linked() { "1" } else { "0" };
        self.storage.set_item(STORAGE_KEY_SESSION_LINKED, flag)
    }
}
