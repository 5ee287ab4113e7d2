use std::sync::Mutex;

use p256::{PublicKey, SecretKey};

use rusty_wallet_sdk_core::ProviderError;

use crate::crypto::{
    derive_shared_secret, export_public_key_hex, generate_key_pair, import_public_key_hex,
    KeyPair, SharedSecret,
};
use crate::storage::ScopedStorage;

const OWN_PRIVATE_KEY: &str = "ownPrivateKey";
const OWN_PUBLIC_KEY: &str = "ownPublicKey";
const PEER_PUBLIC_KEY: &str = "peerPublicKey";

#[derive(Default)]
struct KeyState {
    own: Option<KeyPair>,
    peer: Option<PublicKey>,
    shared: Option<SharedSecret>,
}

/// Key material of the smart-wallet channel. The private key is persisted
/// locally only; nothing here exports it to a peer.
pub struct ScwKeyManager {
    storage: ScopedStorage,
    state: Mutex<KeyState>,
}

impl ScwKeyManager {
    pub fn new(storage: ScopedStorage) -> Self {
        Self {
            storage,
            state: Mutex::new(KeyState::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, KeyState>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Internal(format!("key manager lock poisoned: {e}")))
    }

    pub fn own_public_key(&self) -> Result<PublicKey, ProviderError> {
        let mut g = self.lock()?;
        if let Some(own) = &g.own {
            return Ok(own.public);
        }
        let own = match self.load_own()? {
            Some(own) => own,
            None => {
                let own = generate_key_pair()?;
                self.storage
                    .set_item(OWN_PRIVATE_KEY, &alloy::hex::encode(own.secret.to_bytes()))?;
                self.storage
                    .set_item(OWN_PUBLIC_KEY, &export_public_key_hex(&own.public)?)?;
                own
            }
        };
        let public = own.public;
        g.own = Some(own);
        Ok(public)
    }

    pub fn own_public_key_hex(&self) -> Result<String, ProviderError> {
        export_public_key_hex(&self.own_public_key()?)
    }

    fn load_own(&self) -> Result<Option<KeyPair>, ProviderError> {
        let Some(raw) = self.storage.get_item(OWN_PRIVATE_KEY)? else {
            return Ok(None);
        };
        let bytes = alloy::hex::decode(raw)
            .map_err(|e| ProviderError::Internal(format!("stored private key is corrupt: {e}")))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| ProviderError::Internal(format!("stored private key is invalid: {e}")))?;
        let public = secret.public_key();
        Ok(Some(KeyPair { secret, public }))
    }

    pub fn set_peer_public_key(&self, peer: PublicKey) -> Result<(), ProviderError> {
        self.storage
            .set_item(PEER_PUBLIC_KEY, &export_public_key_hex(&peer)?)?;
        let mut g = self.lock()?;
        g.peer = Some(peer);
        g.shared = None;
        Ok(())
    }

    pub fn peer_public_key(&self) -> Result<Option<PublicKey>, ProviderError> {
        {
            let g = self.lock()?;
            if g.peer.is_some() {
                return Ok(g.peer);
            }
        }
        let Some(raw) = self.storage.get_item(PEER_PUBLIC_KEY)? else {
            return Ok(None);
        };
        let peer = import_public_key_hex(&raw)?;
        self.lock()?.peer = Some(peer);
        Ok(Some(peer))
    }

    /// Shared secret for the current peer, derived once and cached.
    pub fn shared_secret(&self) -> Result<Option<SharedSecret>, ProviderError> {
        if let Some(shared) = self.lock()?.shared.clone() {
            return Ok(Some(shared));
        }
        let Some(peer) = self.peer_public_key()? else {
            return Ok(None);
        };
        self.own_public_key()?;
        let mut g = self.lock()?;
        let shared = match &g.own {
            Some(own) => derive_shared_secret(&own.secret, &peer),
            None => return Ok(None),
        };
        g.shared = Some(shared.clone());
        Ok(Some(shared))
    }

    pub fn clear(&self) -> Result<(), ProviderError> {
        {
            let mut g = self.lock()?;
            *g = KeyState::default();
        }
        self.storage.remove_item(OWN_PRIVATE_KEY)?;
        self.storage.remove_item(OWN_PUBLIC_KEY)?;
        self.storage.remove_item(PEER_PUBLIC_KEY)
    }
}
