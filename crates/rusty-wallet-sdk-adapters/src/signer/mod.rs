pub mod extension;
pub mod registry;
pub mod scw;
pub mod walletlink;

use std::sync::Arc;

use alloy::primitives::Address;
use serde_json::Value;

use rusty_wallet_sdk_core::validation::ensure_address;
use rusty_wallet_sdk_core::{
    is_rejection_message, AppMetadata, InjectedProviderPort, ProviderError, RelayConnectionPort,
    RequestArguments, SignerType, StoragePort, UpdateListener, WalletLinkRelayPort,
};

use crate::popup::PopupTransport;
use crate::relay::WalletLinkRelay;
use crate::storage::ScopedStorage;
use crate::ProviderConfig;

pub use extension::ExtensionSigner;
pub use registry::SignerRegistry;
pub use scw::ScwSigner;
pub use walletlink::WalletLinkSigner;

/// The active wallet backend.
pub enum Signer {
    Extension(ExtensionSigner),
    SmartContractWallet(ScwSigner),
    WalletLink(WalletLinkSigner),
}

impl Signer {
    pub fn signer_type(&self) -> SignerType {
        match self {
            Self::Extension(_) => SignerType::Extension,
            Self::SmartContractWallet(_) => SignerType::SmartContractWallet,
            Self::WalletLink(_) => SignerType::WalletLink,
        }
    }

    pub async fn handshake(&self) -> Result<Vec<Address>, ProviderError> {
        match self {
            Self::Extension(s) => s.handshake().await,
            Self::SmartContractWallet(s) => s.handshake().await,
            Self::WalletLink(s) => s.handshake().await,
        }
    }

    pub async fn request(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        match self {
            Self::Extension(s) => s.request(args).await,
            Self::SmartContractWallet(s) => s.request(args).await,
            Self::WalletLink(s) => s.request(args).await,
        }
    }

    pub async fn disconnect(&self) -> Result<(), ProviderError> {
        match self {
            Self::Extension(s) => s.disconnect().await,
            Self::SmartContractWallet(s) => s.disconnect(),
            Self::WalletLink(s) => s.disconnect(),
        }
    }
}

/// Everything needed to construct any signer variant.
#[derive(Clone)]
pub struct SignerFactory {
    pub metadata: AppMetadata,
    pub config: ProviderConfig,
    pub storage: Arc<dyn StoragePort>,
    pub transport: Arc<PopupTransport>,
    pub listener: Arc<dyn UpdateListener>,
    pub injected: Option<Arc<dyn InjectedProviderPort>>,
    pub walletlink_relay: Option<Arc<dyn WalletLinkRelayPort>>,
    pub relay_connection: Option<Arc<dyn RelayConnectionPort>>,
}

impl SignerFactory {
    pub fn scoped(&self, module: &str) -> ScopedStorage {
        ScopedStorage::new(
            Arc::clone(&self.storage),
            self.config.storage_namespace.clone(),
            module,
        )
    }

    pub fn walletlink_storage(&self) -> ScopedStorage {
        ScopedStorage::new(
            Arc::clone(&self.storage),
            "walletlink",
            self.config.walletlink_url.clone(),
        )
    }

    pub fn create(&self, signer_type: SignerType) -> Result<Signer, ProviderError> {
        match signer_type {
            SignerType::Extension => Ok(Signer::Extension(ExtensionSigner::new(
                self.injected.clone(),
                &self.metadata,
                Arc::clone(&self.listener),
            )?)),
            SignerType::SmartContractWallet => Ok(Signer::SmartContractWallet(ScwSigner::new(
                self.metadata.clone(),
                Arc::clone(&self.transport),
                self.scoped("SCWKeyManager"),
                self.scoped("SCWStateManager"),
                Arc::clone(&self.listener),
            )?)),
            SignerType::WalletLink => {
                let storage = self.walletlink_storage();
                let relay = match (&self.walletlink_relay, &self.relay_connection) {
                    (Some(relay), _) => Arc::clone(relay),
                    (None, Some(connection)) => Arc::new(WalletLinkRelay::new(
                        Arc::clone(connection),
                        storage.clone(),
                        self.config.walletlink_url.clone(),
                    )) as Arc<dyn WalletLinkRelayPort>,
                    (None, None) => {
                        return Err(ProviderError::Internal(
                            "legacy relay connection is not configured".to_owned(),
                        ))
                    }
                };
                Ok(Signer::WalletLink(WalletLinkSigner::new(
                    self.metadata.clone(),
                    storage,
                    relay,
                    Arc::clone(&self.listener),
                )?))
            }
        }
    }
}

/// Folds `denied`/`rejected` phrasing into a user-rejection error.
pub(crate) fn normalize_rejection(err: ProviderError) -> ProviderError {
    match err {
        ProviderError::UserRejected(_) => err,
        other if is_rejection_message(&other.to_string()) => {
            ProviderError::UserRejected(other.to_string())
        }
        other => other,
    }
}

pub(crate) fn parse_accounts(value: &Value) -> Result<Vec<Address>, ProviderError> {
    let items = value
        .as_array()
        .ok_or_else(|| ProviderError::Internal("accounts must be an array".to_owned()))?;
    items.iter().map(ensure_address).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::POPUP_CLOSED;

    #[test]
    fn closed_popup_keeps_its_disconnect_code() {
        let err = normalize_rejection(ProviderError::Disconnected(POPUP_CLOSED.to_owned()));
        assert_eq!(err.code(), 4900);
    }

    #[test]
    fn rejection_phrasing_becomes_user_rejected() {
        let err = normalize_rejection(ProviderError::Internal("User denied access".to_owned()));
        assert_eq!(err.code(), 4001);
    }
}
