use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use rusty_wallet_sdk_adapters::crypto::{
    decrypt_with_session_key, derive_session_key, encrypt_with_session_key,
};
use rusty_wallet_sdk_adapters::{MemoryStorage, ScopedStorage, WalletLinkRelay};
use rusty_wallet_sdk_core::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ProviderError, RelayConnectionPort,
    RelayEventSink, RelayFrame, WalletLinkRelayPort, Web3Request, Web3Response,
};

const RELAY_URL: &str = "https://relay.example";

/// In-process relay socket: frames are pushed by the test.
#[derive(Default)]
struct MockConnection {
    inbound: Mutex<Option<mpsc::UnboundedSender<RelayFrame>>>,
    opened: Mutex<Vec<(String, String)>>,
    sent: Mutex<Vec<JsonRpcRequest>>,
    closes: Mutex<usize>,
}

impl MockConnection {
    fn push(&self, frame: RelayFrame) {
        self.inbound
            .lock()
            .expect("connection lock")
            .as_ref()
            .expect("connection open")
            .send(frame)
            .expect("relay pump alive");
    }

    fn hang_up(&self) {
        self.inbound.lock().expect("connection lock").take();
    }

    fn sent(&self) -> Vec<JsonRpcRequest> {
        self.sent.lock().expect("connection lock").clone()
    }

    async fn wait_for_sent(&self, count: usize) -> Vec<JsonRpcRequest> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("request published")
    }
}

impl RelayConnectionPort for MockConnection {
    fn open(
        &self,
        url: &str,
        session_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<RelayFrame>, ProviderError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().expect("connection lock") = Some(tx);
        self.opened
            .lock()
            .expect("connection lock")
            .push((url.to_owned(), session_id.to_owned()));
        Ok(rx)
    }

    fn send(&self, request: &JsonRpcRequest) -> Result<(), ProviderError> {
        self.sent.lock().expect("connection lock").push(request.clone());
        Ok(())
    }

    fn close(&self) {
        *self.closes.lock().expect("connection lock") += 1;
        self.inbound.lock().expect("connection lock").take();
    }
}

#[derive(Default)]
struct RecordingSink {
    accounts: Mutex<Vec<Vec<Address>>>,
    chains: Mutex<Vec<(u64, String)>>,
}

impl RelayEventSink for RecordingSink {
    fn on_accounts(&self, accounts: Vec<Address>) {
        self.accounts.lock().expect("sink lock").push(accounts);
    }

    fn on_chain(&self, chain_id: u64, json_rpc_url: String) {
        self.chains
            .lock()
            .expect("sink lock")
            .push((chain_id, json_rpc_url));
    }
}

fn relay(connection: &Arc<MockConnection>) -> Arc<WalletLinkRelay> {
    let storage = ScopedStorage::new(Arc::new(MemoryStorage::new()), "walletlink", RELAY_URL);
    Arc::new(WalletLinkRelay::new(connection.clone(), storage, RELAY_URL))
}

fn session_key(relay: &WalletLinkRelay) -> String {
    let info = relay.session().expect("session");
    derive_session_key(&info.id, &info.secret)
}

fn sealed(value: &Value, key: &str) -> Value {
    json!({ "data": encrypt_with_session_key(&value.to_string(), key).expect("encrypt") })
}

fn accounts_request() -> Web3Request {
    Web3Request::RequestEthereumAccounts {
        app_name: "Test Dapp".to_owned(),
        app_logo_url: None,
    }
}

async fn until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition before timeout");
}

#[tokio::test]
async fn published_requests_resolve_from_encrypted_responses() {
    let connection = Arc::new(MockConnection::default());
    let relay = relay(&connection);
    let key = session_key(&relay);

    let pending = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.send_request(accounts_request()).await }
    });

    let sent = connection.wait_for_sent(1).await;
    let request = &sent[0];
    assert_eq!(request.method, "publishEvent");
    assert_eq!(request.params["event"], json!("Web3Request"));
    let info = relay.session().expect("session");
    assert_eq!(request.params["sessionId"], json!(info.id.clone()));
    assert_eq!(
        connection.opened.lock().expect("connection lock").clone(),
        vec![(RELAY_URL.to_owned(), info.id.clone())]
    );

    let plaintext = decrypt_with_session_key(
        request.params["data"].as_str().expect("cipher text"),
        &key,
    )
    .expect("decrypt request");
    let published: Web3Request = serde_json::from_str(&plaintext).expect("web3 request");
    assert_eq!(published, accounts_request());

    let answer = Web3Response::success(
        "requestEthereumAccounts",
        json!(["0x0000000000000000000000000000000000000001"]),
    );
    connection.push(RelayFrame::Response(JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id: json!(request.id),
        result: Some(sealed(&serde_json::to_value(&answer).expect("json"), &key)),
        error: None,
    }));

    let response = pending.await.expect("join").expect("relay response");
    assert_eq!(response, answer);
    assert_eq!(relay.pending_requests(), 0);
}

#[tokio::test]
async fn relay_errors_map_onto_provider_errors() {
    let connection = Arc::new(MockConnection::default());
    let relay = relay(&connection);
    relay.session().expect("session");

    let pending = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.send_request(accounts_request()).await }
    });
    let sent = connection.wait_for_sent(1).await;
    connection.push(RelayFrame::Response(JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id: json!(sent[0].id.to_string()),
        result: None,
        error: Some(JsonRpcError {
            code: -32000,
            message: "User rejected the request".to_owned(),
            data: None,
        }),
    }));

    let err = pending.await.expect("join").expect_err("rejected");
    assert!(matches!(err, ProviderError::UserRejected(_)));
}

#[tokio::test]
async fn notifications_reach_the_event_sink() {
    let connection = Arc::new(MockConnection::default());
    let relay = relay(&connection);
    let sink = Arc::new(RecordingSink::default());
    relay.set_event_sink(sink.clone());
    let key = session_key(&relay);
    assert!(!relay.linked().expect("linked"));

    connection.push(RelayFrame::Notification {
        method: "sessionLinked".to_owned(),
        params: Value::Null,
    });
    let account = Address::with_last_byte(7);
    connection.push(RelayFrame::Notification {
        method: "accountsChanged".to_owned(),
        params: sealed(&json!([account]), &key),
    });
    connection.push(RelayFrame::Notification {
        method: "chainChanged".to_owned(),
        params: sealed(
            &json!({ "chainId": "8453", "jsonRpcUrl": "https://base.example" }),
            &key,
        ),
    });

    until(|| !sink.chains.lock().expect("sink lock").is_empty()).await;
    assert!(relay.linked().expect("linked"));
    assert_eq!(
        sink.accounts.lock().expect("sink lock").clone(),
        vec![vec![account]]
    );
    assert_eq!(
        sink.chains.lock().expect("sink lock").clone(),
        vec![(8453, "https://base.example".to_owned())]
    );
}

#[tokio::test]
async fn undecryptable_notifications_are_dropped() {
    let connection = Arc::new(MockConnection::default());
    let relay = relay(&connection);
    let sink = Arc::new(RecordingSink::default());
    relay.set_event_sink(sink.clone());
    let key = session_key(&relay);
    let wrong = derive_session_key("other", "session");

    connection.push(RelayFrame::Notification {
        method: "accountsChanged".to_owned(),
        params: sealed(&json!([Address::with_last_byte(1)]), &wrong),
    });
    connection.push(RelayFrame::Notification {
        method: "accountsChanged".to_owned(),
        params: sealed(&json!([Address::with_last_byte(2)]), &key),
    });

    until(|| !sink.accounts.lock().expect("sink lock").is_empty()).await;
    assert_eq!(
        sink.accounts.lock().expect("sink lock").clone(),
        vec![vec![Address::with_last_byte(2)]]
    );
}

#[tokio::test]
async fn reset_rejects_pending_requests() {
    let connection = Arc::new(MockConnection::default());
    let relay = relay(&connection);

    let pending = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.send_request(accounts_request()).await }
    });
    connection.wait_for_sent(1).await;
    assert_eq!(relay.pending_requests(), 1);

    relay.reset().expect("reset");
    let err = pending.await.expect("join").expect_err("rejected by reset");
    assert_eq!(err, ProviderError::Disconnected("relay session reset".to_owned()));
    assert_eq!(*connection.closes.lock().expect("connection lock"), 1);
    assert_eq!(relay.pending_requests(), 0);
}

#[tokio::test]
async fn dropped_connection_rejects_pending_requests() {
    let connection = Arc::new(MockConnection::default());
    let relay = relay(&connection);

    let pending = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.send_request(accounts_request()).await }
    });
    connection.wait_for_sent(1).await;
    connection.hang_up();

    let err = pending.await.expect("join").expect_err("connection closed");
    assert_eq!(err, ProviderError::Disconnected("relay connection closed".to_owned()));

    // The next request opens a fresh connection on the same session.
    let first_session = connection.opened.lock().expect("connection lock")[0].1.clone();
    relay.session().expect("session");
    let opened = connection.opened.lock().expect("connection lock").clone();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1].1, first_session);
}
