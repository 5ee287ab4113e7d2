use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use serde_json::Value;
use tracing::debug;

use rusty_wallet_sdk_core::validation::json_chain_id_to_u64;
use rusty_wallet_sdk_core::{
    AppMetadata, Chain, InjectedProviderPort, ProviderError, RequestArguments, UpdateListener,
};

use super::{normalize_rejection, parse_accounts};

/// Pass-through to a provider injected by a browser extension.
pub struct ExtensionSigner {
    provider: Arc<dyn InjectedProviderPort>,
    listener: Arc<dyn UpdateListener>,
    accounts: Arc<Mutex<Vec<Address>>>,
}

impl ExtensionSigner {
    pub fn new(
        provider: Option<Arc<dyn InjectedProviderPort>>,
        metadata: &AppMetadata,
        listener: Arc<dyn UpdateListener>,
    ) -> Result<Self, ProviderError> {
        let provider = provider
            .ok_or_else(|| ProviderError::Internal("wallet extension not found".to_owned()))?;
        provider.set_app_info(&metadata.app_name, metadata.app_logo_url.as_deref());

        let accounts = Arc::new(Mutex::new(Vec::new()));
        let accounts_cache = Arc::clone(&accounts);
        let accounts_listener = Arc::clone(&listener);
        provider.on(
            "accountsChanged",
            Arc::new(move |value: Value| match parse_accounts(&value) {
                Ok(update) => {
                    if let Ok(mut g) = accounts_cache.lock() {
                        g.clone_from(&update);
                    }
                    accounts_listener.on_accounts_update(update);
                }
                Err(e) => debug!("ignoring malformed accountsChanged payload: {e}"),
            }),
        );
        let chain_listener = Arc::clone(&listener);
        provider.on(
            "chainChanged",
            Arc::new(move |value: Value| match json_chain_id_to_u64(&value) {
                Ok(id) => chain_listener.on_chain_update(Chain::new(id)),
                Err(e) => debug!("ignoring malformed chainChanged payload: {e}"),
            }),
        );
        let message_listener = Arc::clone(&listener);
        provider.on(
            "message",
            Arc::new(move |value: Value| message_listener.on_message("message", value)),
        );

        Ok(Self {
            provider,
            listener,
            accounts,
        })
    }

    fn lock_accounts(&self) -> Result<std::sync::MutexGuard<'_, Vec<Address>>, ProviderError> {
        self.accounts
            .lock()
            .map_err(|e| ProviderError::Internal(format!("extension accounts lock poisoned: {e}")))
    }

    /// Requests accounts from the extension unless some are already known.
    pub async fn handshake(&self) -> Result<Vec<Address>, ProviderError> {
        let cached = self.lock_accounts()?.clone();
        if !cached.is_empty() {
            self.listener.on_accounts_update(cached.clone());
            return Ok(cached);
        }

        let result = self
            .provider
            .request(&RequestArguments::without_params("eth_requestAccounts"))
            .await
            .map_err(normalize_rejection)?;
        let accounts = parse_accounts(&result)?;
        self.lock_accounts()?.clone_from(&accounts);
        self.listener.on_accounts_update(accounts.clone());
        Ok(accounts)
    }

    pub async fn request(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        self.provider.request(args).await
    }

    pub async fn disconnect(&self) -> Result<(), ProviderError> {
        self.lock_accounts()?.clear();
        self.provider.disconnect().await
    }
}
