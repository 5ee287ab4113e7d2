use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::{Chain, RequestArguments};
use crate::error::ProviderError;
use crate::message::{InboundMessage, WalletLinkSessionInfo};
use crate::web3::{JsonRpcRequest, JsonRpcResponse, RelayFrame, Web3Request, Web3Response};

/// Raw key-value persistence, shared by every scoped store.
pub trait StoragePort: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, ProviderError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), ProviderError>;
    fn remove_item(&self, key: &str) -> Result<(), ProviderError>;
    fn keys(&self) -> Result<Vec<String>, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl PopupGeometry {
    pub fn centered(viewport: Viewport, width: u32, height: u32) -> Self {
        let left = viewport.left + (viewport.width as i32 - width as i32) / 2;
        let top = viewport.top + (viewport.height as i32 - height as i32) / 2;
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Window layer hosting the wallet popup.
///
/// `open` hands back the channel of messages posted to the dapp while the
/// window is alive; the channel closes when the window goes away.
pub trait PopupWindowPort: Send + Sync {
    fn viewport(&self) -> Viewport;
    fn open(
        &self,
        url: &str,
        geometry: PopupGeometry,
    ) -> Result<mpsc::UnboundedReceiver<InboundMessage>, ProviderError>;
    fn focus(&self);
    fn close(&self);
    fn is_open(&self) -> bool;
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), ProviderError>;
}

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// A provider object already injected into the page by a browser extension.
#[async_trait]
pub trait InjectedProviderPort: Send + Sync {
    fn set_app_info(&self, app_name: &str, app_logo_url: Option<&str>);
    fn on(&self, event: &str, handler: EventHandler);
    async fn request(&self, args: &RequestArguments) -> Result<Value, ProviderError>;
    async fn disconnect(&self) -> Result<(), ProviderError>;
}

/// Receives unsolicited updates pushed by the legacy relay.
pub trait RelayEventSink: Send + Sync {
    fn on_accounts(&self, accounts: Vec<Address>);
    fn on_chain(&self, chain_id: u64, json_rpc_url: String);
}

#[async_trait]
pub trait WalletLinkRelayPort: Send + Sync {
    fn session(&self) -> Result<WalletLinkSessionInfo, ProviderError>;
    fn set_event_sink(&self, sink: Arc<dyn RelayEventSink>);
    async fn send_request(&self, request: Web3Request) -> Result<Web3Response, ProviderError>;
    fn reset(&self) -> Result<(), ProviderError>;
}

/// Socket-level link to the relay server.
pub trait RelayConnectionPort: Send + Sync {
    fn open(
        &self,
        url: &str,
        session_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<RelayFrame>, ProviderError>;
    fn send(&self, request: &JsonRpcRequest) -> Result<(), ProviderError>;
    fn close(&self);
}

#[async_trait]
pub trait RpcTransportPort: Send + Sync {
    async fn call(
        &self,
        rpc_url: &str,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, ProviderError>;
}

/// Callbacks a signer uses to push account and chain changes upward.
pub trait UpdateListener: Send + Sync {
    fn on_accounts_update(&self, accounts: Vec<Address>);
    fn on_chain_update(&self, chain: Chain);
    fn on_message(&self, _kind: &str, _data: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_is_centered_in_viewport() {
        let viewport = Viewport {
            left: 100,
            top: 50,
            width: 1280,
            height: 800,
        };
        let geometry = PopupGeometry::centered(viewport, 420, 540);
        assert_eq!(geometry.left, 100 + 430);
        assert_eq!(geometry.top, 50 + 130);
    }
}
