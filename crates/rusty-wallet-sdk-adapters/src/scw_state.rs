use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use serde_json::Value;
use tracing::debug;

use rusty_wallet_sdk_core::{Chain, ProviderError, UpdateListener};

use crate::storage::ScopedStorage;

const ACCOUNTS_KEY: &str = "accounts";
const ACTIVE_CHAIN_KEY: &str = "activeChain";
const AVAILABLE_CHAINS_KEY: &str = "availableChains";
const WALLET_CAPABILITIES_KEY: &str = "walletCapabilities";

#[derive(Debug, Clone, Default)]
struct ScwState {
    accounts: Vec<Address>,
    active_chain: Chain,
    available_chains: Vec<Chain>,
    wallet_capabilities: Option<Value>,
}

/// Persisted accounts, chains and capabilities of the smart-wallet signer.
pub struct ScwStateManager {
    storage: ScopedStorage,
    listener: Arc<dyn UpdateListener>,
    default_chain: Chain,
    state: Mutex<ScwState>,
}

impl ScwStateManager {
    pub fn new(
        storage: ScopedStorage,
        listener: Arc<dyn UpdateListener>,
        app_chain_ids: &[u64],
    ) -> Result<Self, ProviderError> {
        let accounts: Option<Vec<Address>> = storage.load_object(ACCOUNTS_KEY)?;
        let active_chain: Option<Chain> = storage.load_object(ACTIVE_CHAIN_KEY)?;
        let available_chains: Option<Vec<Chain>> = storage.load_object(AVAILABLE_CHAINS_KEY)?;
        let wallet_capabilities: Option<Value> = storage.load_object(WALLET_CAPABILITIES_KEY)?;
        let default_chain = Chain::new(app_chain_ids.first().copied().unwrap_or(1));
        let state = ScwState {
            accounts: accounts.unwrap_or_default(),
            active_chain: active_chain.unwrap_or_else(|| default_chain.clone()),
            available_chains: available_chains.unwrap_or_default(),
            wallet_capabilities,
        };
        Ok(Self {
            storage,
            listener,
            default_chain,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ScwState>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Internal(format!("scw state lock poisoned: {e}")))
    }

    pub fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.lock()?.accounts.clone())
    }

    pub fn active_chain(&self) -> Result<Chain, ProviderError> {
        Ok(self.lock()?.active_chain.clone())
    }

    pub fn available_chains(&self) -> Result<Vec<Chain>, ProviderError> {
        Ok(self.lock()?.available_chains.clone())
    }

    pub fn wallet_capabilities(&self) -> Result<Option<Value>, ProviderError> {
        Ok(self.lock()?.wallet_capabilities.clone())
    }

    pub fn update_accounts(&self, accounts: Vec<Address>) -> Result<(), ProviderError> {
        self.lock()?.accounts = accounts.clone();
        self.storage.store_object(ACCOUNTS_KEY, &accounts)?;
        self.listener.on_accounts_update(accounts);
        Ok(())
    }

    /// Activates an available chain. Unknown ids return `false`; the current
    /// chain returns `true` without notifying.
    pub fn switch_chain(&self, chain_id: u64) -> Result<bool, ProviderError> {
        let chain = {
            let mut g = self.lock()?;
            let Some(chain) = g.available_chains.iter().find(|c| c.id == chain_id).cloned() else {
                return Ok(false);
            };
            if chain == g.active_chain {
                return Ok(true);
            }
            g.active_chain = chain.clone();
            chain
        };
        debug!(chain_id, "scw active chain switched");
        self.storage.store_object(ACTIVE_CHAIN_KEY, &chain)?;
        self.listener.on_chain_update(chain);
        Ok(true)
    }

    pub fn update_available_chains(
        &self,
        raw_chains: &BTreeMap<u64, String>,
    ) -> Result<(), ProviderError> {
        if raw_chains.is_empty() {
            return Ok(());
        }
        let chains: Vec<Chain> = raw_chains
            .iter()
            .map(|(id, rpc_url)| Chain::with_rpc_url(*id, rpc_url.clone()))
            .collect();
        let active_id = {
            let mut g = self.lock()?;
            g.available_chains = chains.clone();
            g.active_chain.id
        };
        self.storage.store_object(AVAILABLE_CHAINS_KEY, &chains)?;
        self.switch_chain(active_id)?;
        Ok(())
    }

    pub fn update_wallet_capabilities(&self, capabilities: Value) -> Result<(), ProviderError> {
        self.lock()?.wallet_capabilities = Some(capabilities.clone());
        self.storage
            .store_object(WALLET_CAPABILITIES_KEY, &capabilities)
    }

    pub fn clear(&self) -> Result<(), ProviderError> {
        {
            let mut g = self.lock()?;
            g.accounts.clear();
            g.active_chain = self.default_chain.clone();
            g.available_chains.clear();
            g.wallet_capabilities = None;
        }
        self.storage.clear()
    }
}
