use alloy::primitives::Address;
use serde_json::Value;

use crate::domain::{addresses_value, Chain, ProviderEventKind};

/// Account and chain cache behind the provider facade.
///
/// An empty account list means the provider is disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderState {
    pub accounts: Vec<Address>,
    pub chain: Chain,
    chain_emitted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub kind: ProviderEventKind,
    pub value: Value,
}

impl ProviderState {
    pub fn new(chain: Chain) -> Self {
        Self {
            accounts: Vec::new(),
            chain,
            chain_emitted: false,
        }
    }

    pub fn connected(&self) -> bool {
        !self.accounts.is_empty()
    }

    pub fn selected_address(&self) -> Option<Address> {
        self.accounts.first().copied()
    }

    /// Replaces the cached accounts. Equal lists (order included) emit nothing.
    pub fn apply_accounts(&mut self, accounts: Vec<Address>) -> Option<StateTransition> {
        if self.accounts == accounts {
            return None;
        }
        self.accounts = accounts;
        Some(StateTransition {
            kind: ProviderEventKind::AccountsChanged,
            value: addresses_value(&self.accounts),
        })
    }

    /// Replaces the cached chain. The first determination always emits;
    /// later ones emit unless both id and rpc url are unchanged.
    pub fn apply_chain(&mut self, chain: Chain) -> Option<StateTransition> {
        if self.chain_emitted && chain == self.chain {
            return None;
        }
        self.chain_emitted = true;
        self.chain = chain;
        Some(StateTransition {
            kind: ProviderEventKind::ChainChanged,
            value: Value::String(self.chain.hex_id()),
        })
    }

    pub fn reset(&mut self) {
        self.accounts.clear();
        self.chain = Chain::default();
        self.chain_emitted = false;
    }
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new(Chain::default())
    }
}
