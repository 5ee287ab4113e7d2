use std::collections::BTreeMap;
use std::sync::Mutex;

use alloy::primitives::{address, keccak256, Address, Bytes};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use rusty_wallet_sdk_core::standard_error_codes::provider::{
    UNSUPPORTED_CHAIN, UNSUPPORTED_METHOD, USER_REJECTED_REQUEST,
};
use rusty_wallet_sdk_core::validation::json_chain_id_to_u64;
use rusty_wallet_sdk_core::{
    addresses_value, EncryptedData, ErrorPayload, InboundMessage, MessageId, PopupEvent,
    PopupGeometry, PopupMessage, PopupWindowPort, ProviderError, RequestArguments, RpcResult,
    ScwRequest, ScwResponse, ScwResponseData, ScwUpdate, SignerType, Viewport,
};

use crate::crypto::{
    decrypt_content, derive_shared_secret, encrypt_content, export_public_key_hex,
    generate_key_pair, import_public_key_hex, KeyPair, SharedSecret,
};

const DEFAULT_ACCOUNT: Address = address!("1000000000000000000000000000000000000001");

#[derive(Default)]
struct LoopbackState {
    outbound: Option<mpsc::UnboundedSender<InboundMessage>>,
    origin: String,
    next_id: u64,
    keys: Option<KeyPair>,
    secret: Option<SharedSecret>,
    posted: Vec<PopupMessage>,
}

#[derive(Debug, Clone)]
struct WalletProfile {
    signer_type: SignerType,
    accounts: Vec<Address>,
    chains: BTreeMap<u64, String>,
    capabilities: Value,
    reject: bool,
    blocked: bool,
}

/// In-process wallet popup. Answers the picker, the key exchange and
/// encrypted requests with deterministic results.
pub struct LoopbackPopup {
    profile: Mutex<WalletProfile>,
    state: Mutex<LoopbackState>,
}

impl Default for LoopbackPopup {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackPopup {
    pub fn new() -> Self {
        let chains = BTreeMap::from([
            (1, "https://eth.llamarpc.com".to_owned()),
            (8453, "https://mainnet.base.org".to_owned()),
            (84532, "https://sepolia.base.org".to_owned()),
        ]);
        Self {
            profile: Mutex::new(WalletProfile {
                signer_type: SignerType::SmartContractWallet,
                accounts: vec![DEFAULT_ACCOUNT],
                chains,
                capabilities: json!({
                    "0x2105": { "paymasterService": { "supported": true } },
                }),
                reject: false,
                blocked: false,
            }),
            state: Mutex::new(LoopbackState::default()),
        }
    }

    pub fn with_accounts(self, accounts: Vec<Address>) -> Self {
        self.update_profile(|p| p.accounts = accounts);
        self
    }

    pub fn with_chains(self, chains: BTreeMap<u64, String>) -> Self {
        self.update_profile(|p| p.chains = chains);
        self
    }

    pub fn with_signer_type(self, signer_type: SignerType) -> Self {
        self.update_profile(|p| p.signer_type = signer_type);
        self
    }

    /// Every subsequent handshake and request is rejected by the "user".
    pub fn set_reject(&self, reject: bool) {
        self.update_profile(|p| p.reject = reject);
    }

    /// Makes `open` fail the way a popup blocker would.
    pub fn set_blocked(&self, blocked: bool) {
        self.update_profile(|p| p.blocked = blocked);
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.profile().accounts
    }

    /// Messages the dapp posted to the popup, oldest first.
    pub fn posted(&self) -> Vec<PopupMessage> {
        self.state.lock().map(|g| g.posted.clone()).unwrap_or_default()
    }

    /// Sends an unsolicited encrypted update. Fails before a key exchange.
    pub fn push_update(&self, update: &ScwUpdate) -> Result<(), ProviderError> {
        let data = {
            let g = self.lock()?;
            let secret = g
                .secret
                .as_ref()
                .ok_or_else(|| ProviderError::Internal("no loopback session".to_owned()))?;
            encrypted_value(secret, update)?
        };
        self.emit(PopupMessage::new(PopupEvent::Update, data))
    }

    /// Simulates the user closing the popup.
    pub fn unload(&self) -> Result<(), ProviderError> {
        self.emit(PopupMessage::new(PopupEvent::PopupUnload, Value::Null))
    }

    fn profile(&self) -> WalletProfile {
        match self.profile.lock() {
            Ok(g) => g.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    fn update_profile(&self, f: impl FnOnce(&mut WalletProfile)) {
        match self.profile.lock() {
            Ok(mut g) => f(&mut g),
            Err(e) => f(&mut e.into_inner()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LoopbackState>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Internal(format!("loopback lock poisoned: {e}")))
    }

    fn emit(&self, mut message: PopupMessage) -> Result<(), ProviderError> {
        let mut g = self.lock()?;
        if message.id.is_none() {
            g.next_id += 1;
            message.id = Some(MessageId(g.next_id));
        }
        let data = serde_json::to_value(&message)
            .map_err(|e| ProviderError::Internal(format!("encode loopback message failed: {e}")))?;
        let outbound = g
            .outbound
            .as_ref()
            .ok_or_else(|| ProviderError::Disconnected("loopback popup is closed".to_owned()))?;
        outbound
            .send(InboundMessage {
                origin: g.origin.clone(),
                from_popup: true,
                data,
            })
            .map_err(|_| ProviderError::Disconnected("loopback popup is closed".to_owned()))
    }

    fn respond(&self, request: &PopupMessage, reply: PopupMessage) -> Result<(), ProviderError> {
        let Some(id) = request.id else {
            return Ok(());
        };
        let mut reply = reply;
        reply.request_id = Some(id);
        reply.event = PopupEvent::Response;
        self.emit(reply)
    }

    fn handle(&self, message: PopupMessage) -> Result<(), ProviderError> {
        match message.event {
            PopupEvent::SelectSignerType => {
                let signer_type = self.profile().signer_type;
                self.respond(
                    &message,
                    PopupMessage::new(PopupEvent::Response, json!(signer_type.as_str())),
                )
            }
            PopupEvent::Handshake => self.handle_handshake(&message),
            PopupEvent::Request => self.handle_request(&message),
            _ => Ok(()),
        }
    }

    fn handle_handshake(&self, message: &PopupMessage) -> Result<(), ProviderError> {
        let profile = self.profile();
        if profile.reject {
            let rejection = ErrorPayload {
                code: Some(USER_REJECTED_REQUEST),
                message: "User rejected the request.".to_owned(),
            };
            let data = serde_json::to_value(rejection)
                .map_err(|e| ProviderError::Internal(format!("encode rejection failed: {e}")))?;
            return self.respond(message, PopupMessage::new(PopupEvent::Response, data));
        }

        let peer_hex = message
            .sender
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidParams("handshake without sender".to_owned()))?;
        let peer = import_public_key_hex(peer_hex)?;
        let keys = generate_key_pair()?;
        let secret = derive_shared_secret(&keys.secret, &peer);
        let own_hex = export_public_key_hex(&keys.public)?;

        let response = ScwResponse {
            result: RpcResult::Value(addresses_value(&profile.accounts)),
            data: Some(response_data(&profile)),
        };
        let data = encrypted_value(&secret, &response)?;
        {
            let mut g = self.lock()?;
            g.keys = Some(keys);
            g.secret = Some(secret);
        }
        debug!("loopback handshake answered");
        self.respond(
            message,
            PopupMessage::new(PopupEvent::Response, data).with_sender(own_hex),
        )
    }

    fn handle_request(&self, message: &PopupMessage) -> Result<(), ProviderError> {
        let (secret, own_hex) = {
            let g = self.lock()?;
            let secret = g
                .secret
                .clone()
                .ok_or_else(|| ProviderError::Internal("no loopback session".to_owned()))?;
            let own_hex = match &g.keys {
                Some(keys) => export_public_key_hex(&keys.public)?,
                None => String::new(),
            };
            (secret, own_hex)
        };
        let encrypted: EncryptedData = serde_json::from_value(message.data.clone())
            .map_err(|e| ProviderError::Internal(format!("malformed loopback request: {e}")))?;
        let request: ScwRequest = decrypt_content(&secret, &encrypted)?;
        debug!(method = %request.action.method, chain_id = request.chain_id, "loopback request");

        let response = ScwResponse {
            result: self.answer(&request.action),
            data: None,
        };
        let data = encrypted_value(&secret, &response)?;
        self.respond(
            message,
            PopupMessage::new(PopupEvent::Response, data).with_sender(own_hex),
        )
    }

    fn answer(&self, action: &RequestArguments) -> RpcResult {
        let profile = self.profile();
        if profile.reject {
            return rpc_error(USER_REJECTED_REQUEST, "User rejected the request.");
        }
        match action.method.as_str() {
            "eth_requestAccounts" => RpcResult::Value(addresses_value(&profile.accounts)),
            "personal_sign" | "eth_signTypedData_v4" | "eth_signTypedData_v3"
            | "eth_signTypedData_v1" | "eth_signTypedData" | "eth_signTransaction" => {
                let signer = profile.accounts.first().copied().unwrap_or_default();
                RpcResult::Value(json!(deterministic_signature(action, signer).to_string()))
            }
            "eth_sendTransaction" | "wallet_sendCalls" => {
                let canonical = serde_json::to_vec(&action.params_or_empty()).unwrap_or_default();
                RpcResult::Value(json!(keccak256(canonical).to_string()))
            }
            "wallet_switchEthereumChain" => {
                let requested = action
                    .param(0)
                    .and_then(|p| p.get("chainId"))
                    .and_then(|raw| json_chain_id_to_u64(raw).ok());
                match requested {
                    Some(id) if profile.chains.contains_key(&id) => RpcResult::Value(Value::Null),
                    _ => rpc_error(UNSUPPORTED_CHAIN, "Unrecognized chain ID."),
                }
            }
            "wallet_getCapabilities" => RpcResult::Value(profile.capabilities),
            other => rpc_error(
                UNSUPPORTED_METHOD,
                &format!("The wallet does not support {other}."),
            ),
        }
    }
}

impl PopupWindowPort for LoopbackPopup {
    fn viewport(&self) -> Viewport {
        Viewport {
            left: 0,
            top: 0,
            width: 1280,
            height: 800,
        }
    }

    fn open(
        &self,
        url: &str,
        geometry: PopupGeometry,
    ) -> Result<mpsc::UnboundedReceiver<InboundMessage>, ProviderError> {
        if self.profile().blocked {
            return Err(ProviderError::Internal("Pop up window failed to open".to_owned()));
        }
        let origin = Url::parse(url)
            .map_err(|e| ProviderError::Internal(format!("invalid popup url: {e}")))?
            .origin()
            .ascii_serialization();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut g = self.lock()?;
            g.outbound = Some(tx);
            g.origin = origin;
        }
        debug!(left = geometry.left, top = geometry.top, "loopback popup opened");
        self.emit(PopupMessage::new(PopupEvent::PopupLoaded, Value::Null))?;
        Ok(rx)
    }

    fn focus(&self) {}

    fn close(&self) {
        if let Ok(mut g) = self.state.lock() {
            g.outbound = None;
        }
    }

    fn is_open(&self) -> bool {
        self.state
            .lock()
            .map(|g| g.outbound.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    fn post_message(&self, message: Value, _target_origin: &str) -> Result<(), ProviderError> {
        let message: PopupMessage = serde_json::from_value(message)
            .map_err(|e| ProviderError::Internal(format!("malformed popup message: {e}")))?;
        self.lock()?.posted.push(message.clone());
        self.handle(message)
    }
}

fn response_data(profile: &WalletProfile) -> ScwResponseData {
    ScwResponseData {
        chains: Some(profile.chains.clone()),
        capabilities: Some(profile.capabilities.clone()),
    }
}

fn rpc_error(code: i64, message: &str) -> RpcResult {
    RpcResult::Error(ErrorPayload {
        code: Some(code),
        message: message.to_owned(),
    })
}

fn encrypted_value<T: serde::Serialize>(
    secret: &SharedSecret,
    content: &T,
) -> Result<Value, ProviderError> {
    let encrypted = encrypt_content(secret, content)?;
    serde_json::to_value(encrypted)
        .map_err(|e| ProviderError::Internal(format!("encode encrypted payload failed: {e}")))
}

/// 65-byte stand-in signature: keccak(method ‖ signer ‖ params) twice, then v = 27.
pub fn deterministic_signature(action: &RequestArguments, signer: Address) -> Bytes {
    let mut seed = Vec::new();
    seed.extend_from_slice(action.method.as_bytes());
    seed.extend_from_slice(signer.as_slice());
    seed.extend_from_slice(action.params_or_empty().to_string().as_bytes());
    let hash = keccak256(seed);
    let mut sig = Vec::with_capacity(65);
    sig.extend_from_slice(hash.as_slice());
    sig.extend_from_slice(hash.as_slice());
    sig.push(27);
    Bytes::from(sig)
}
