use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use rusty_wallet_sdk_adapters::{FilterPolyfill, FilterResponse, RpcFetch};
use rusty_wallet_sdk_core::ProviderError;

const FILTER_TIMEOUT: Duration = Duration::from_secs(300);
const THROTTLE: Duration = Duration::from_secs(1);

/// Node double with a movable head and canned logs.
struct FakeNode {
    height: Mutex<u64>,
    logs: Mutex<Value>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeNode {
    fn at_height(height: u64) -> Arc<Self> {
        Arc::new(Self {
            height: Mutex::new(height),
            logs: Mutex::new(json!([])),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn set_height(&self, height: u64) {
        *self.height.lock().expect("node lock") = height;
    }

    fn set_logs(&self, logs: Value) {
        *self.logs.lock().expect("node lock") = logs;
    }

    fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .expect("node lock")
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl RpcFetch for FakeNode {
    async fn fetch(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.calls
            .lock()
            .expect("node lock")
            .push((method.to_owned(), params.clone()));
        Ok(match method {
            "eth_blockNumber" => json!(format!("{:#x}", *self.height.lock().expect("node lock"))),
            "eth_getBlockByNumber" => {
                let number = params[0].as_str().unwrap_or_default().to_owned();
                json!({ "number": number, "hash": format!("0xhash{number}") })
            }
            "eth_getLogs" => self.logs.lock().expect("node lock").clone(),
            _ => Value::Null,
        })
    }
}

fn polyfill(node: &Arc<FakeNode>) -> FilterPolyfill {
    FilterPolyfill::new(node.clone(), FILTER_TIMEOUT, THROTTLE)
}

async fn call(filters: &FilterPolyfill, method: &str, params: Value) -> FilterResponse {
    let params = params.as_array().cloned().unwrap_or_default();
    filters.request(method, &params).await.expect("filter call")
}

fn result(response: FilterResponse) -> Value {
    match response {
        FilterResponse::Result(value) => value,
        FilterResponse::Error(e) => panic!("unexpected filter error {e:?}"),
    }
}

fn is_not_found(response: &FilterResponse) -> bool {
    matches!(response, FilterResponse::Error(e) if e.code == -32000)
}

#[tokio::test(start_paused = true)]
async fn block_filter_reports_each_new_block_once() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let id = result(call(&filters, "eth_newBlockFilter", json!([])).await);
    assert_eq!(id, json!("0x1"));

    let first = result(call(&filters, "eth_getFilterChanges", json!([id])).await);
    assert_eq!(first, json!(["0xhash0x10"]));

    node.set_height(0x12);
    tokio::time::advance(Duration::from_secs(2)).await;
    let second = result(call(&filters, "eth_getFilterChanges", json!([id])).await);
    assert_eq!(second, json!(["0xhash0x11", "0xhash0x12"]));

    let third = result(call(&filters, "eth_getFilterChanges", json!([id])).await);
    assert_eq!(third, json!([]));
}

#[tokio::test(start_paused = true)]
async fn block_height_is_throttled() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let id = result(call(&filters, "eth_newBlockFilter", json!([])).await);
    call(&filters, "eth_getFilterChanges", json!([id])).await;
    call(&filters, "eth_getFilterChanges", json!([id])).await;
    assert_eq!(node.calls_to("eth_blockNumber").len(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    call(&filters, "eth_getFilterChanges", json!([id])).await;
    assert_eq!(node.calls_to("eth_blockNumber").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn idle_filters_expire() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let id = result(call(&filters, "eth_newBlockFilter", json!([])).await);
    tokio::task::yield_now().await;
    tokio::time::sleep(FILTER_TIMEOUT + Duration::from_secs(1)).await;

    assert_eq!(filters.filter_count().expect("count"), 0);
    let response = call(&filters, "eth_getFilterChanges", json!([id])).await;
    assert!(is_not_found(&response));
}

#[tokio::test(start_paused = true)]
async fn polling_renews_the_timeout() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let id = result(call(&filters, "eth_newPendingTransactionFilter", json!([])).await);
    tokio::time::sleep(Duration::from_secs(200)).await;
    let changes = result(call(&filters, "eth_getFilterChanges", json!([id])).await);
    assert_eq!(changes, json!([]));

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(filters.filter_count().expect("count"), 1);

    tokio::time::sleep(Duration::from_secs(101)).await;
    assert_eq!(filters.filter_count().expect("count"), 0);
}

#[tokio::test(start_paused = true)]
async fn log_filter_moves_its_cursor_past_delivered_logs() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let id = result(
        call(
            &filters,
            "eth_newFilter",
            json!([{ "fromBlock": "0x10", "address": "0x00000000000000000000000000000000000000aa" }]),
        )
        .await,
    );

    node.set_logs(json!([{ "blockNumber": "0x10", "logIndex": "0x0" }]));
    let first = result(call(&filters, "eth_getFilterChanges", json!([id.clone()])).await);
    assert_eq!(first.as_array().map(Vec::len), Some(1));

    node.set_height(0x12);
    node.set_logs(json!([]));
    tokio::time::advance(Duration::from_secs(2)).await;
    call(&filters, "eth_getFilterChanges", json!([id.clone()])).await;

    let queries = node.calls_to("eth_getLogs");
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0][0]["fromBlock"], json!("0x10"));
    assert_eq!(queries[0][0]["toBlock"], json!("0x10"));
    assert_eq!(
        queries[0][0]["address"],
        json!(["0x00000000000000000000000000000000000000aa"])
    );
    assert_eq!(queries[1][0]["fromBlock"], json!("0x11"));
    assert_eq!(queries[1][0]["toBlock"], json!("0x12"));

    // Full history keeps the original range.
    call(&filters, "eth_getFilterLogs", json!([id])).await;
    let queries = node.calls_to("eth_getLogs");
    assert_eq!(queries[2][0]["fromBlock"], json!("0x10"));
    assert_eq!(queries[2][0]["toBlock"], json!("latest"));
}

#[tokio::test(start_paused = true)]
async fn future_start_block_waits_for_the_chain() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let id = result(call(&filters, "eth_newFilter", json!([{ "fromBlock": "0x20" }])).await);
    let changes = result(call(&filters, "eth_getFilterChanges", json!([id])).await);
    assert_eq!(changes, json!([]));
    assert!(node.calls_to("eth_getLogs").is_empty());
}

#[tokio::test(start_paused = true)]
async fn uninstall_removes_the_filter() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let first = result(call(&filters, "eth_newBlockFilter", json!([])).await);
    let second = result(call(&filters, "eth_newBlockFilter", json!([])).await);
    assert_eq!(second, json!("0x2"));

    let removed = result(call(&filters, "eth_uninstallFilter", json!([first.clone()])).await);
    assert_eq!(removed, json!(true));
    assert_eq!(filters.filter_count().expect("count"), 1);
    assert!(is_not_found(
        &call(&filters, "eth_getFilterChanges", json!([first])).await
    ));
    assert!(is_not_found(
        &call(&filters, "eth_getFilterLogs", json!([second])).await
    ));
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let node = FakeNode::at_height(0x10);
    let filters = polyfill(&node);

    let err = filters
        .request("eth_getFilterChanges", &[json!({ "id": 1 })])
        .await
        .expect_err("bad id");
    assert!(matches!(err, ProviderError::InvalidParams(_)));

    let err = filters
        .request("eth_newFilter", &[json!({ "fromBlock": "yesterday" })])
        .await
        .expect_err("bad block tag");
    assert!(matches!(err, ProviderError::InvalidParams(_)));

    let err = filters
        .request("eth_getBalance", &[])
        .await
        .expect_err("not a filter method");
    assert_eq!(err, ProviderError::MethodNotFound("eth_getBalance".to_owned()));
}
