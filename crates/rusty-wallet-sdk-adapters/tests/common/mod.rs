#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use rusty_wallet_sdk_adapters::{LoopbackPopup, MemoryStorage, ProviderOptions, WalletProvider};
use rusty_wallet_sdk_core::{
    addresses_value, AppMetadata, Chain, EventHandler, InjectedProviderPort, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, Preference, ProviderError, ProviderEvent, RelayEventSink,
    RequestArguments, RpcTransportPort, UpdateListener, WalletLinkRelayPort,
    WalletLinkSessionInfo, Web3Request, Web3Response,
};

pub fn account(last: u8) -> Address {
    Address::with_last_byte(last)
}

pub fn loopback_account() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid loopback account")
}

pub fn test_metadata() -> AppMetadata {
    AppMetadata::new("Test Dapp")
}

/// JSON-RPC node stub answering by method name.
#[derive(Default)]
pub struct StubRpc {
    results: Mutex<HashMap<String, Result<Value, JsonRpcError>>>,
    calls: Mutex<Vec<(String, JsonRpcRequest)>>,
}

impl StubRpc {
    pub fn with_result(self, method: &str, result: Value) -> Self {
        self.results
            .lock()
            .expect("stub rpc lock")
            .insert(method.to_owned(), Ok(result));
        self
    }

    pub fn with_error(self, method: &str, code: i64, message: &str) -> Self {
        self.results.lock().expect("stub rpc lock").insert(
            method.to_owned(),
            Err(JsonRpcError {
                code,
                message: message.to_owned(),
                data: None,
            }),
        );
        self
    }

    pub fn calls(&self) -> Vec<(String, JsonRpcRequest)> {
        self.calls.lock().expect("stub rpc lock").clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|(_, request)| request.method)
            .collect()
    }
}

#[async_trait]
impl RpcTransportPort for StubRpc {
    async fn call(
        &self,
        rpc_url: &str,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, ProviderError> {
        self.calls
            .lock()
            .expect("stub rpc lock")
            .push((rpc_url.to_owned(), request.clone()));
        let outcome = self
            .results
            .lock()
            .expect("stub rpc lock")
            .get(&request.method)
            .cloned()
            .unwrap_or(Ok(Value::Null));
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Ok(JsonRpcResponse {
            jsonrpc: "2.0".to_owned(),
            id: Value::from(request.id),
            result,
            error,
        })
    }
}

type RelayHandler = Box<dyn Fn(&Web3Request) -> Result<Web3Response, ProviderError> + Send + Sync>;

/// Legacy relay stand-in with a scripted wallet.
pub struct ScriptedRelay {
    handler: RelayHandler,
    sent: Mutex<Vec<Web3Request>>,
    sink: Mutex<Option<Arc<dyn RelayEventSink>>>,
    resets: Mutex<usize>,
}

impl ScriptedRelay {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Web3Request) -> Result<Web3Response, ProviderError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            resets: Mutex::new(0),
        }
    }

    pub fn sent(&self) -> Vec<Web3Request> {
        self.sent.lock().expect("relay lock").clone()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().expect("relay lock")
    }

    pub fn sink(&self) -> Arc<dyn RelayEventSink> {
        self.sink
            .lock()
            .expect("relay lock")
            .clone()
            .expect("event sink installed")
    }
}

#[async_trait]
impl WalletLinkRelayPort for ScriptedRelay {
    fn session(&self) -> Result<WalletLinkSessionInfo, ProviderError> {
        Ok(WalletLinkSessionInfo {
            id: "c0ffee".to_owned(),
            secret: "5ecre7".to_owned(),
        })
    }

    fn set_event_sink(&self, sink: Arc<dyn RelayEventSink>) {
        *self.sink.lock().expect("relay lock") = Some(sink);
    }

    async fn send_request(&self, request: Web3Request) -> Result<Web3Response, ProviderError> {
        self.sent.lock().expect("relay lock").push(request.clone());
        (self.handler)(&request)
    }

    fn reset(&self) -> Result<(), ProviderError> {
        *self.resets.lock().expect("relay lock") += 1;
        Ok(())
    }
}

/// Update listener that records every notification.
#[derive(Default)]
pub struct RecordingListener {
    pub accounts: Mutex<Vec<Vec<Address>>>,
    pub chains: Mutex<Vec<Chain>>,
}

impl RecordingListener {
    pub fn account_updates(&self) -> Vec<Vec<Address>> {
        self.accounts.lock().expect("listener lock").clone()
    }

    pub fn chain_updates(&self) -> Vec<Chain> {
        self.chains.lock().expect("listener lock").clone()
    }
}

impl UpdateListener for RecordingListener {
    fn on_accounts_update(&self, accounts: Vec<Address>) {
        self.accounts.lock().expect("listener lock").push(accounts);
    }

    fn on_chain_update(&self, chain: Chain) {
        self.chains.lock().expect("listener lock").push(chain);
    }
}

/// Browser-extension provider stand-in. Events are fired by the test.
pub struct InjectedStub {
    accounts: Vec<Address>,
    reject: Mutex<bool>,
    handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
    app_info: Mutex<Option<(String, Option<String>)>>,
    requests: Mutex<Vec<RequestArguments>>,
    disconnects: Mutex<usize>,
}

impl InjectedStub {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self {
            accounts,
            reject: Mutex::new(false),
            handlers: Mutex::new(HashMap::new()),
            app_info: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            disconnects: Mutex::new(0),
        }
    }

    pub fn set_reject(&self, reject: bool) {
        *self.reject.lock().expect("injected lock") = reject;
    }

    pub fn emit(&self, event: &str, value: Value) {
        let handlers = self
            .handlers
            .lock()
            .expect("injected lock")
            .get(event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(value.clone());
        }
    }

    pub fn app_info(&self) -> Option<(String, Option<String>)> {
        self.app_info.lock().expect("injected lock").clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("injected lock")
            .iter()
            .map(|r| r.method.clone())
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        *self.disconnects.lock().expect("injected lock")
    }
}

#[async_trait]
impl InjectedProviderPort for InjectedStub {
    fn set_app_info(&self, app_name: &str, app_logo_url: Option<&str>) {
        *self.app_info.lock().expect("injected lock") =
            Some((app_name.to_owned(), app_logo_url.map(str::to_owned)));
    }

    fn on(&self, event: &str, handler: EventHandler) {
        self.handlers
            .lock()
            .expect("injected lock")
            .entry(event.to_owned())
            .or_default()
            .push(handler);
    }

    async fn request(&self, args: &RequestArguments) -> Result<Value, ProviderError> {
        self.requests.lock().expect("injected lock").push(args.clone());
        if *self.reject.lock().expect("injected lock") {
            return Err(ProviderError::Internal(
                "User denied account authorization".to_owned(),
            ));
        }
        match args.method.as_str() {
            "eth_requestAccounts" | "eth_accounts" => Ok(addresses_value(&self.accounts)),
            "eth_chainId" => Ok(json!("0x1")),
            other => Ok(json!({ "method": other, "params": args.params })),
        }
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        *self.disconnects.lock().expect("injected lock") += 1;
        Ok(())
    }
}

pub struct LoopbackHarness {
    pub provider: WalletProvider,
    pub popup: Arc<LoopbackPopup>,
    pub storage: Arc<MemoryStorage>,
    pub rpc: Arc<StubRpc>,
}

pub fn loopback_harness() -> LoopbackHarness {
    harness_with(
        Arc::new(MemoryStorage::new()),
        Arc::new(LoopbackPopup::new()),
        StubRpc::default().with_result("eth_blockNumber", Value::from("0x10")),
    )
}

pub fn harness_with(
    storage: Arc<MemoryStorage>,
    popup: Arc<LoopbackPopup>,
    rpc: StubRpc,
) -> LoopbackHarness {
    let rpc = Arc::new(rpc);
    let mut options = ProviderOptions::new(test_metadata(), storage.clone(), popup.clone());
    options.rpc = Some(rpc.clone());
    options.location = "https://dapp.example".to_owned();
    let provider = WalletProvider::new(options).expect("build provider");
    LoopbackHarness {
        provider,
        popup,
        storage,
        rpc,
    }
}

pub struct InjectedHarness {
    pub provider: WalletProvider,
    pub injected: Arc<InjectedStub>,
    pub popup: Arc<LoopbackPopup>,
    pub storage: Arc<MemoryStorage>,
}

pub fn injected_harness(injected: InjectedStub, preference: Preference) -> InjectedHarness {
    let injected = Arc::new(injected);
    let storage = Arc::new(MemoryStorage::new());
    let popup = Arc::new(LoopbackPopup::new());
    let mut options = ProviderOptions::new(test_metadata(), storage.clone(), popup.clone());
    options.preference = preference;
    options.injected = Some(injected.clone());
    options.rpc = Some(Arc::new(StubRpc::default()));
    options.location = "https://dapp.example".to_owned();
    let provider = WalletProvider::new(options).expect("build provider");
    InjectedHarness {
        provider,
        injected,
        popup,
        storage,
    }
}

pub async fn next_event(events: &mut broadcast::Receiver<ProviderEvent>) -> ProviderEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event before timeout")
        .expect("event channel open")
}
