use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use rusty_wallet_sdk_core::validation::{hex_string_from_int, is_hex_string};
use rusty_wallet_sdk_core::{JsonRpcError, ProviderError};

use crate::rpc::RpcFetch;

const FILTER_NOT_FOUND_CODE: i64 = -32000;

/// Outcome of a polyfilled filter call. Unknown filters are reported in-band
/// rather than as a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterResponse {
    Result(Value),
    Error(JsonRpcError),
}

impl FilterResponse {
    fn not_found() -> Self {
        Self::Error(JsonRpcError {
            code: FILTER_NOT_FOUND_CODE,
            message: "filter not found".to_owned(),
            data: None,
        })
    }

    fn empty() -> Self {
        Self::Result(json!([]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    fn parse(value: Option<&Value>) -> Result<Self, ProviderError> {
        match value.and_then(Value::as_str) {
            None if value.map_or(true, Value::is_null) => Ok(Self::Latest),
            Some("latest") | Some("pending") => Ok(Self::Latest),
            Some("earliest") => Ok(Self::Number(0)),
            Some(raw) if raw.starts_with("0x") && is_hex_string(raw) => {
                parse_hex_u64(raw).map(Self::Number)
            }
            _ => Err(ProviderError::InvalidParams(format!(
                "Invalid block option: {}",
                value.cloned().unwrap_or(Value::Null)
            ))),
        }
    }

    fn to_value(self) -> Value {
        match self {
            Self::Latest => json!("latest"),
            Self::Number(n) => json!(hex_string_from_int(n)),
        }
    }
}

#[derive(Debug, Clone)]
struct LogFilter {
    from_block: BlockTag,
    to_block: BlockTag,
    addresses: Option<Value>,
    topics: Value,
}

impl LogFilter {
    fn from_param(param: &Value) -> Result<Self, ProviderError> {
        let addresses = match param.get("address") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(Value::Array(items.clone())),
            Some(single) => Some(Value::Array(vec![single.clone()])),
        };
        Ok(Self {
            from_block: BlockTag::parse(param.get("fromBlock"))?,
            to_block: BlockTag::parse(param.get("toBlock"))?,
            addresses,
            topics: param.get("topics").cloned().unwrap_or_else(|| json!([])),
        })
    }

    fn to_param(&self, from_block: BlockTag, to_block: BlockTag) -> Value {
        let mut param = json!({
            "fromBlock": from_block.to_value(),
            "toBlock": to_block.to_value(),
            "topics": self.topics,
        });
        if let Some(addresses) = &self.addresses {
            param["address"] = addresses.clone();
        }
        param
    }
}

#[derive(Debug, Clone)]
enum FilterKind {
    Log(LogFilter),
    Block,
    PendingTransaction,
}

struct FilterEntry {
    kind: FilterKind,
    cursor: u64,
    timeout_token: u64,
    timeout: JoinHandle<()>,
}

#[derive(Default)]
struct FilterTable {
    next_id: u64,
    next_token: u64,
    filters: HashMap<u64, FilterEntry>,
}

#[derive(Default)]
struct BlockHeight {
    fetched_at: Option<Instant>,
    height: Option<u64>,
}

/// Client-side emulation of the node filter API on top of plain reads.
pub struct FilterPolyfill {
    rpc: Arc<dyn RpcFetch>,
    table: Arc<Mutex<FilterTable>>,
    height: tokio::sync::Mutex<BlockHeight>,
    timeout: Duration,
    throttle: Duration,
}

impl FilterPolyfill {
    pub fn new(rpc: Arc<dyn RpcFetch>, timeout: Duration, throttle: Duration) -> Self {
        Self {
            rpc,
            table: Arc::new(Mutex::new(FilterTable::default())),
            height: tokio::sync::Mutex::new(BlockHeight::default()),
            timeout,
            throttle,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<FilterResponse, ProviderError> {
        let first = params.first().unwrap_or(&Value::Null);
        match method {
            "eth_newFilter" => {
                let filter = LogFilter::from_param(first)?;
                let start = filter.from_block;
                self.install(FilterKind::Log(filter), start).await
            }
            "eth_newBlockFilter" => self.install(FilterKind::Block, BlockTag::Latest).await,
            "eth_newPendingTransactionFilter" => {
                self.install(FilterKind::PendingTransaction, BlockTag::Latest)
                    .await
            }
            "eth_getFilterChanges" => self.get_filter_changes(filter_id_param(first)?).await,
            "eth_getFilterLogs" => self.get_filter_logs(filter_id_param(first)?).await,
            "eth_uninstallFilter" => {
                let id = filter_id_param(first)?;
                info!(id, "uninstalling filter");
                self.delete(id)?;
                Ok(FilterResponse::Result(json!(true)))
            }
            other => Err(ProviderError::MethodNotFound(other.to_owned())),
        }
    }

    pub fn filter_count(&self) -> Result<usize, ProviderError> {
        Ok(self.lock()?.filters.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, FilterTable>, ProviderError> {
        self.table
            .lock()
            .map_err(|e| ProviderError::Internal(format!("filter table lock poisoned: {e}")))
    }

    async fn install(
        &self,
        kind: FilterKind,
        start: BlockTag,
    ) -> Result<FilterResponse, ProviderError> {
        let height = self.current_block_height().await?;
        let cursor = match start {
            BlockTag::Number(n) if n > height => n,
            _ => height,
        };
        let mut g = self.lock()?;
        g.next_id += 1;
        let id = g.next_id;
        let (timeout_token, timeout) = self.spawn_timeout(&mut g, id);
        info!(id, cursor, kind = kind_name(&kind), "installing filter");
        g.filters.insert(
            id,
            FilterEntry {
                kind,
                cursor,
                timeout_token,
                timeout,
            },
        );
        Ok(FilterResponse::Result(json!(hex_string_from_int(id))))
    }

    fn spawn_timeout(&self, table: &mut FilterTable, id: u64) -> (u64, JoinHandle<()>) {
        table.next_token += 1;
        let token = table.next_token;
        let shared = Arc::clone(&self.table);
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Ok(mut g) = shared.lock() {
                if g.filters.get(&id).is_some_and(|f| f.timeout_token == token) {
                    g.filters.remove(&id);
                    info!(id, "filter timed out");
                }
            }
        });
        (token, handle)
    }

    fn delete(&self, id: u64) -> Result<(), ProviderError> {
        if let Some(entry) = self.lock()?.filters.remove(&id) {
            entry.timeout.abort();
        }
        Ok(())
    }

    /// Snapshot of a filter with its timeout renewed, or `None` when unknown.
    fn touch(&self, id: u64) -> Result<Option<(FilterKind, u64)>, ProviderError> {
        let mut g = self.lock()?;
        if !g.filters.contains_key(&id) {
            return Ok(None);
        }
        let (token, handle) = self.spawn_timeout(&mut g, id);
        let Some(entry) = g.filters.get_mut(&id) else {
            handle.abort();
            return Ok(None);
        };
        entry.timeout.abort();
        entry.timeout = handle;
        entry.timeout_token = token;
        Ok(Some((entry.kind.clone(), entry.cursor)))
    }

    fn advance_cursor(&self, id: u64, cursor: u64) -> Result<(), ProviderError> {
        if let Some(entry) = self.lock()?.filters.get_mut(&id) {
            if cursor > entry.cursor {
                debug!(id, from = entry.cursor, to = cursor, "moving filter cursor");
                entry.cursor = cursor;
            }
        }
        Ok(())
    }

    async fn get_filter_changes(&self, id: u64) -> Result<FilterResponse, ProviderError> {
        match self.touch(id)? {
            Some((FilterKind::Log(filter), cursor)) => {
                self.log_filter_changes(id, &filter, cursor).await
            }
            Some((FilterKind::Block, cursor)) => self.block_filter_changes(id, cursor).await,
            Some((FilterKind::PendingTransaction, _)) => Ok(FilterResponse::empty()),
            None => Ok(FilterResponse::not_found()),
        }
    }

    async fn get_filter_logs(&self, id: u64) -> Result<FilterResponse, ProviderError> {
        let filter = match self.lock()?.filters.get(&id) {
            Some(FilterEntry {
                kind: FilterKind::Log(filter),
                ..
            }) => filter.clone(),
            _ => return Ok(FilterResponse::not_found()),
        };
        let param = filter.to_param(filter.from_block, filter.to_block);
        let logs = self.rpc.fetch("eth_getLogs", json!([param])).await?;
        Ok(FilterResponse::Result(logs))
    }

    async fn log_filter_changes(
        &self,
        id: u64,
        filter: &LogFilter,
        cursor: u64,
    ) -> Result<FilterResponse, ProviderError> {
        let height = self.current_block_height().await?;
        if cursor > height {
            return Ok(FilterResponse::empty());
        }
        let to_block = match filter.to_block {
            BlockTag::Latest => height,
            BlockTag::Number(n) => {
                if cursor > n {
                    return Ok(FilterResponse::empty());
                }
                n
            }
        };
        debug!(id, from = cursor, to = to_block, "fetching filter logs");
        let param = filter.to_param(BlockTag::Number(cursor), BlockTag::Number(to_block));
        let logs = self.rpc.fetch("eth_getLogs", json!([param])).await?;
        if let Some(items) = logs.as_array() {
            let highest = items
                .iter()
                .filter_map(|log| log.get("blockNumber").and_then(Value::as_str))
                .filter_map(|raw| parse_hex_u64(raw).ok())
                .max();
            if let Some(highest) = highest.filter(|h| *h >= cursor) {
                self.advance_cursor(id, highest + 1)?;
            }
        }
        Ok(FilterResponse::Result(logs))
    }

    async fn block_filter_changes(
        &self,
        id: u64,
        cursor: u64,
    ) -> Result<FilterResponse, ProviderError> {
        let height = self.current_block_height().await?;
        if cursor > height {
            return Ok(FilterResponse::empty());
        }
        debug!(id, from = cursor, to = height, "fetching filter blocks");
        let lookups = (cursor..=height).map(|n| self.block_hash(n));
        let mut hashes = Vec::new();
        for hash in join_all(lookups).await {
            if let Some(hash) = hash? {
                hashes.push(Value::String(hash));
            }
        }
        self.advance_cursor(id, cursor + hashes.len() as u64)?;
        Ok(FilterResponse::Result(Value::Array(hashes)))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<String>, ProviderError> {
        let block = self
            .rpc
            .fetch(
                "eth_getBlockByNumber",
                json!([hex_string_from_int(number), false]),
            )
            .await?;
        Ok(block
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_owned))
    }

    /// Latest block number, fetched at most once per throttle interval.
    async fn current_block_height(&self) -> Result<u64, ProviderError> {
        let mut g = self.height.lock().await;
        let stale = match (g.fetched_at, g.height) {
            (Some(at), Some(_)) => at.elapsed() > self.throttle,
            _ => true,
        };
        if stale {
            let raw = self.rpc.fetch("eth_blockNumber", json!([])).await?;
            let height = raw
                .as_str()
                .ok_or_else(|| ProviderError::Internal(format!("invalid block number: {raw}")))
                .and_then(parse_hex_u64)?;
            g.fetched_at = Some(Instant::now());
            g.height = Some(height);
        }
        g.height
            .ok_or_else(|| ProviderError::Internal("block height unavailable".to_owned()))
    }
}

impl Drop for FilterPolyfill {
    fn drop(&mut self) {
        if let Ok(mut g) = self.table.lock() {
            for (_, entry) in g.filters.drain() {
                entry.timeout.abort();
            }
        }
    }
}

fn kind_name(kind: &FilterKind) -> &'static str {
    match kind {
        FilterKind::Log(_) => "log",
        FilterKind::Block => "block",
        FilterKind::PendingTransaction => "pendingTransaction",
    }
}

fn parse_hex_u64(raw: &str) -> Result<u64, ProviderError> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidParams(format!("invalid hex number {raw}: {e}")))
}

fn filter_id_param(value: &Value) -> Result<u64, ProviderError> {
    match value {
        Value::String(raw) if is_hex_string(raw) => parse_hex_u64(raw),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ProviderError::InvalidParams(format!("invalid filter id: {n}"))),
        other => Err(ProviderError::InvalidParams(format!(
            "invalid filter id: {other}"
        ))),
    }
}
