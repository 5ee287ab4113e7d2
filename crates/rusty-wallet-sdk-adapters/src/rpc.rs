use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use rusty_wallet_sdk_core::{
    Chain, JsonRpcRequest, JsonRpcResponse, ProviderError, RpcTransportPort, LIB_VERSION,
};

use crate::ProviderConfig;

/// Anything that can report the chain requests should currently go to.
pub trait ChainSource: Send + Sync {
    fn current_chain(&self) -> Result<Chain, ProviderError>;
}

impl ChainSource for Chain {
    fn current_chain(&self) -> Result<Chain, ProviderError> {
        Ok(self.clone())
    }
}

/// Plain JSON-RPC read access, used by the facade's fetch path and the filter
/// polyfill.
#[async_trait]
pub trait RpcFetch: Send + Sync {
    async fn fetch(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// JSON-RPC client bound to whichever chain its source reports at call time.
pub struct ChainRpc {
    transport: Arc<dyn RpcTransportPort>,
    chain: Arc<dyn ChainSource>,
    next_id: AtomicU64,
}

impl ChainRpc {
    pub fn new(transport: Arc<dyn RpcTransportPort>, chain: Arc<dyn ChainSource>) -> Self {
        Self {
            transport,
            chain,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RpcFetch for ChainRpc {
    async fn fetch(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let chain = self.chain.current_chain()?;
        let rpc_url = chain
            .rpc_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ProviderError::Internal("No RPC URL set for chain".to_owned()))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        debug!(method, chain_id = chain.id, "rpc fetch");
        let response = self.transport.call(&rpc_url, &request).await?;
        if let Some(error) = response.error {
            return Err(ProviderError::Custom {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// `reqwest`-backed JSON-RPC transport.
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    client: reqwest::Client,
    strict: bool,
}

impl HttpRpcClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .build()
            .map_err(|e| ProviderError::Internal(format!("failed to build rpc client: {e}")))?;
        Ok(Self {
            client,
            strict: config.strict_runtime_required(),
        })
    }
}

#[async_trait]
impl RpcTransportPort for HttpRpcClient {
    async fn call(
        &self,
        rpc_url: &str,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, ProviderError> {
        let url = url::Url::parse(rpc_url)
            .map_err(|e| ProviderError::Internal(format!("invalid rpc url {rpc_url}: {e}")))?;
        if self.strict && url.scheme() != "https" {
            return Err(ProviderError::Internal(format!(
                "refusing non-https rpc url in production profile: {rpc_url}"
            )));
        }
        let response = self
            .client
            .post(url)
            .header("X-Wallet-Sdk-Version", LIB_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Internal(format!("rpc request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Internal(format!(
                "rpc request failed with status {status}"
            )));
        }
        response
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| ProviderError::Internal(format!("rpc response decode failed: {e}")))
    }
}
