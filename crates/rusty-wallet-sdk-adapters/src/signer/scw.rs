use std::sync::{Arc, Weak};

use alloy::primitives::Address;
use serde_json::{json, Value};
use tracing::{debug, warn};

use rusty_wallet_sdk_core::validation::json_chain_id_to_u64;
use rusty_wallet_sdk_core::{
    addresses_value, format_address, AppMetadata, EncryptedData, ErrorPayload, PopupEvent,
    PopupMessage, ProviderError, RequestArguments, RpcResult, ScwHandshakeRequest, ScwRequest,
    ScwResponse, ScwResponseData, ScwUpdate, UpdateListener,
};

use super::parse_accounts;
use crate::crypto::{decrypt_content, encrypt_content, import_public_key_hex};
use crate::key_manager::ScwKeyManager;
use crate::popup::PopupTransport;
use crate::scw_state::ScwStateManager;
use crate::storage::ScopedStorage;

struct ScwShared {
    keys: ScwKeyManager,
    state: ScwStateManager,
}

impl ScwShared {
    fn apply_data(&self, data: &ScwResponseData) -> Result<(), ProviderError> {
        if let Some(chains) = &data.chains {
            self.state.update_available_chains(chains)?;
        }
        if let Some(capabilities) = &data.capabilities {
            self.state.update_wallet_capabilities(capabilities.clone())?;
        }
        Ok(())
    }

    fn decrypt_message<T: serde::de::DeserializeOwned>(
        &self,
        message: &PopupMessage,
    ) -> Result<T, ProviderError> {
        let secret = self
            .keys
            .shared_secret()?
            .ok_or_else(|| ProviderError::Unauthorized("Invalid session".to_owned()))?;
        let encrypted: EncryptedData = serde_json::from_value(message.data.clone())
            .map_err(|e| ProviderError::Internal(format!("malformed encrypted payload: {e}")))?;
        decrypt_content(&secret, &encrypted)
    }

    fn handle_update(&self, message: &PopupMessage) -> Result<(), ProviderError> {
        let update: ScwUpdate = self.decrypt_message(message)?;
        if let Some(data) = &update.data {
            self.apply_data(data)?;
        }
        if let Some(accounts) = update.accounts {
            self.state.update_accounts(accounts)?;
        }
        if let Some(chain_id) = update.chain_id {
            self.state.switch_chain(chain_id)?;
        }
        Ok(())
    }
}

/// Signer backed by the smart wallet behind the popup, speaking the
/// ECDH-encrypted request/response protocol.
pub struct ScwSigner {
    metadata: AppMetadata,
    transport: Arc<PopupTransport>,
    shared: Arc<ScwShared>,
}

impl ScwSigner {
    pub fn new(
        metadata: AppMetadata,
        transport: Arc<PopupTransport>,
        key_storage: ScopedStorage,
        state_storage: ScopedStorage,
        listener: Arc<dyn UpdateListener>,
    ) -> Result<Self, ProviderError> {
        let state =
            ScwStateManager::new(state_storage, Arc::clone(&listener), &metadata.app_chain_ids)?;
        let cached = state.accounts()?;
        if !cached.is_empty() {
            listener.on_accounts_update(cached);
            listener.on_chain_update(state.active_chain()?);
        }
        let shared = Arc::new(ScwShared {
            keys: ScwKeyManager::new(key_storage),
            state,
        });

        let weak: Weak<ScwShared> = Arc::downgrade(&shared);
        transport.subscribe(Arc::new(move |message: &PopupMessage| {
            let Some(shared) = weak.upgrade() else {
                return false;
            };
            if message.event == PopupEvent::Update {
                if let Err(e) = shared.handle_update(message) {
                    warn!("dropping smart wallet update: {e}");
                }
            }
            true
        }))?;

        Ok(Self {
            metadata,
            transport,
            shared,
        })
    }

    pub fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.shared.state.accounts()
    }

    pub async fn handshake(&self) -> Result<Vec<Address>, ProviderError> {
        let cached = self.shared.state.accounts()?;
        if !cached.is_empty() {
            return Ok(cached);
        }

        let request = ScwHandshakeRequest {
            method: "eth_requestAccounts".to_owned(),
            params: self.metadata.clone(),
        };
        let data = serde_json::to_value(&request)
            .map_err(|e| ProviderError::Internal(format!("encode handshake failed: {e}")))?;
        let message = PopupMessage::new(PopupEvent::Handshake, data)
            .with_sender(self.shared.keys.own_public_key_hex()?);
        let response = self
            .transport
            .post_request_and_wait_for_response(message)
            .await?;

        let Some(sender) = response.sender.as_deref() else {
            let payload: ErrorPayload = serde_json::from_value(response.data).map_err(|e| {
                ProviderError::Internal(format!("malformed handshake failure: {e}"))
            })?;
            return Err(payload.into());
        };
        self.shared
            .keys
            .set_peer_public_key(import_public_key_hex(sender)?)?;

        let result = self.decode_response(&response)?;
        let accounts = parse_accounts(&result)?;
        if accounts.is_empty() {
            return Err(ProviderError::Internal(
                "wallet returned no accounts".to_owned(),
            ));
        }
        debug!(count = accounts.len(), "smart wallet handshake complete");
        self.shared.state.update_accounts(accounts.clone())?;
        Ok(accounts)
    }

    pub async fn request(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        if let Some(local) = self.try_local(args)? {
            return Ok(local);
        }
        if self.shared.state.accounts()?.is_empty() {
            return Err(ProviderError::unauthorized());
        }

        let result = self.send_encrypted(args).await?;
        if args.method == "wallet_switchEthereumChain" {
            if let Some(chain_id) = requested_chain_id(args) {
                self.shared.state.switch_chain(chain_id)?;
            }
        }
        Ok(result)
    }

    /// Methods answered from cached state without a popup round trip.
    fn try_local(&self, args: &RequestArguments) -> Result<Option<Value>, ProviderError> {
        let state = &self.shared.state;
        let value = match args.method.as_str() {
            "eth_accounts" => addresses_value(&state.accounts()?),
            "eth_coinbase" => match state.accounts()?.first() {
                Some(address) => json!(format_address(address)),
                None => Value::Null,
            },
            "net_version" => json!(state.active_chain()?.id),
            "eth_chainId" => json!(state.active_chain()?.hex_id()),
            "wallet_getCapabilities" => match state.wallet_capabilities()? {
                Some(capabilities) => capabilities,
                None => return Ok(None),
            },
            "wallet_switchEthereumChain" => match requested_chain_id(args) {
                Some(chain_id) if state.switch_chain(chain_id)? => Value::Null,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    async fn send_encrypted(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        let secret = self
            .shared
            .keys
            .shared_secret()?
            .ok_or_else(|| ProviderError::Unauthorized("Invalid session".to_owned()))?;
        let body = ScwRequest {
            action: args.clone(),
            chain_id: self.shared.state.active_chain()?.id,
        };
        let encrypted = encrypt_content(&secret, &body)?;
        let data = serde_json::to_value(&encrypted)
            .map_err(|e| ProviderError::Internal(format!("encode request failed: {e}")))?;
        let message = PopupMessage::new(PopupEvent::Request, data)
            .with_sender(self.shared.keys.own_public_key_hex()?);
        let response = self
            .transport
            .post_request_and_wait_for_response(message)
            .await?;
        self.decode_response(&response)
    }

    fn decode_response(&self, response: &PopupMessage) -> Result<Value, ProviderError> {
        let decoded: ScwResponse = self.shared.decrypt_message(response)?;
        if let Some(data) = &decoded.data {
            self.shared.apply_data(data)?;
        }
        match decoded.result {
            RpcResult::Value(value) => Ok(value),
            RpcResult::Error(payload) => Err(payload.into()),
        }
    }

    pub fn disconnect(&self) -> Result<(), ProviderError> {
        self.shared.state.clear()?;
        self.shared.keys.clear()
    }
}

fn requested_chain_id(args: &RequestArguments) -> Option<u64> {
    json_chain_id_to_u64(args.param(0)?.get("chainId")?).ok()
}
