use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::{debug, info, warn};

use rusty_wallet_sdk_core::{
    PopupEvent, PopupMessage, Preference, ProviderError, SignerType, WalletOptions,
};

use super::{Signer, SignerFactory};
use crate::storage::ScopedStorage;

const SIGNER_TYPE_KEY: &str = "SignerType";

/// Chooses, caches and persists the active signer backend.
pub struct SignerRegistry {
    factory: SignerFactory,
    storage: ScopedStorage,
    cache: Mutex<HashMap<SignerType, Arc<Signer>>>,
}

impl SignerRegistry {
    pub fn new(factory: SignerFactory) -> Self {
        let storage = factory.scoped("SignerConfigurator");
        Self {
            factory,
            storage,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &SignerFactory {
        &self.factory
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SignerType, Arc<Signer>>>, ProviderError> {
        self.cache
            .lock()
            .map_err(|e| ProviderError::Internal(format!("signer cache lock poisoned: {e}")))
    }

    pub fn stored_type(&self) -> Result<Option<SignerType>, ProviderError> {
        Ok(self
            .storage
            .get_item(SIGNER_TYPE_KEY)?
            .as_deref()
            .and_then(SignerType::parse))
    }

    /// Rebuilds the previously persisted signer without any network traffic.
    pub fn load(&self) -> Result<Option<Arc<Signer>>, ProviderError> {
        match self.stored_type()? {
            Some(signer_type) => {
                debug!(signer = signer_type.as_str(), "restoring persisted signer");
                self.get(signer_type).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Cached instance for `signer_type`, constructed on first use.
    pub fn get(&self, signer_type: SignerType) -> Result<Arc<Signer>, ProviderError> {
        if let Some(signer) = self.lock()?.get(&signer_type) {
            return Ok(Arc::clone(signer));
        }
        let signer = Arc::new(self.factory.create(signer_type)?);
        let mut g = self.lock()?;
        let entry = g.entry(signer_type).or_insert(signer);
        Ok(Arc::clone(entry))
    }

    pub fn store(&self, signer_type: SignerType) -> Result<(), ProviderError> {
        self.storage.set_item(SIGNER_TYPE_KEY, signer_type.as_str())
    }

    pub fn clear(&self) -> Result<(), ProviderError> {
        self.lock()?.clear();
        self.storage.remove_item(SIGNER_TYPE_KEY)
    }

    /// Asks the picker popup which backend to use. An injected extension wins
    /// unless the preference insists on the smart wallet.
    pub async fn select(
        self: &Arc<Self>,
        preference: &Preference,
    ) -> Result<SignerType, ProviderError> {
        let smart_wallet_only = preference.options == WalletOptions::SmartWalletOnly;
        if !smart_wallet_only && self.factory.injected.is_some() {
            info!(signer = SignerType::Extension.as_str(), "signer selected");
            return Ok(SignerType::Extension);
        }

        let transport = &self.factory.transport;
        transport.connect().await?;
        self.listen_for_walletlink_session()?;

        let data = serde_json::to_value(preference)
            .map_err(|e| ProviderError::Internal(format!("encode preference failed: {e}")))?;
        let message = PopupMessage::new(PopupEvent::SelectSignerType, data);
        let response = transport.post_request_and_wait_for_response(message).await?;
        let signer_type = response
            .data
            .as_str()
            .and_then(SignerType::parse)
            .ok_or_else(|| {
                ProviderError::Internal(format!("unknown signer type: {}", response.data))
            })?;
        info!(signer = signer_type.as_str(), "signer selected");
        Ok(signer_type)
    }

    fn listen_for_walletlink_session(self: &Arc<Self>) -> Result<(), ProviderError> {
        let pending = self
            .factory
            .transport
            .on_message(|m| m.event == PopupEvent::WalletLinkSessionRequest)?;
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            if pending.wait().await.is_err() {
                return;
            }
            if let Err(e) = registry.handle_walletlink_session_request().await {
                warn!("walletlink side channel failed: {e}");
            }
        });
        Ok(())
    }

    async fn handle_walletlink_session_request(&self) -> Result<(), ProviderError> {
        let signer = self.get(SignerType::WalletLink)?;
        let Signer::WalletLink(walletlink) = signer.as_ref() else {
            return Err(ProviderError::Internal(
                "cached walletlink signer has the wrong type".to_owned(),
            ));
        };
        let session = walletlink.session()?;
        let transport = &self.factory.transport;
        transport.post_message(PopupMessage::new(
            PopupEvent::WalletLinkUpdate,
            json!({ "session": { "id": session.id, "secret": session.secret } }),
        ))?;
        signer.handshake().await?;
        transport.post_message(PopupMessage::new(
            PopupEvent::WalletLinkUpdate,
            json!({ "connected": true }),
        ))?;
        info!("walletlink session connected through picker");
        Ok(())
    }
}
