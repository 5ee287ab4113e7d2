use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_ERROR_DOCS_URL: &str = "https://docs.cloud.coinbase.com/wallet-sdk/docs/errors";

pub mod standard_error_codes {
    pub mod rpc {
        pub const PARSE: i64 = -32700;
        pub const INVALID_INPUT: i64 = -32000;
        pub const RESOURCE_NOT_FOUND: i64 = -32001;
        pub const RESOURCE_UNAVAILABLE: i64 = -32002;
        pub const TRANSACTION_REJECTED: i64 = -32003;
        pub const METHOD_NOT_SUPPORTED: i64 = -32004;
        pub const LIMIT_EXCEEDED: i64 = -32005;
        pub const INVALID_REQUEST: i64 = -32600;
        pub const METHOD_NOT_FOUND: i64 = -32601;
        pub const INVALID_PARAMS: i64 = -32602;
        pub const INTERNAL: i64 = -32603;
    }

    pub mod provider {
        pub const USER_REJECTED_REQUEST: i64 = 4001;
        pub const UNAUTHORIZED: i64 = 4100;
        pub const UNSUPPORTED_METHOD: i64 = 4200;
        pub const DISCONNECTED: i64 = 4900;
        pub const CHAIN_DISCONNECTED: i64 = 4901;
        pub const UNSUPPORTED_CHAIN: i64 = 4902;
    }
}

use standard_error_codes::{provider, rpc};

/// Error kinds surfaced by the provider, its signers and transports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("{message}")]
    InvalidRequest { message: String, data: Option<Value> },
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("the requested method is not supported by this provider: {0}")]
    UnsupportedMethod(String),
    #[error("{0}")]
    MethodNotSupported(String),
    #[error("the method does not exist / is not available: {0}")]
    MethodNotFound(String),
    #[error("{0}")]
    UserRejected(String),
    #[error("unrecognized chain ID")]
    UnsupportedChain,
    #[error("Unknown Ethereum address: {0}")]
    UnknownAddress(String),
    #[error("filter not found")]
    FilterNotFound,
    #[error("{0}")]
    Disconnected(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{message}")]
    Custom { code: i64, message: String },
}

impl ProviderError {
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidRequest { .. } => rpc::INVALID_REQUEST,
            Self::InvalidParams(_) => rpc::INVALID_PARAMS,
            Self::Unauthorized(_) => provider::UNAUTHORIZED,
            Self::UnsupportedMethod(_) => provider::UNSUPPORTED_METHOD,
            Self::MethodNotSupported(_) => rpc::METHOD_NOT_SUPPORTED,
            Self::MethodNotFound(_) => rpc::METHOD_NOT_FOUND,
            Self::UserRejected(_) => provider::USER_REJECTED_REQUEST,
            Self::UnsupportedChain => provider::UNSUPPORTED_CHAIN,
            Self::UnknownAddress(_) => rpc::INTERNAL,
            Self::FilterNotFound => rpc::INVALID_INPUT,
            Self::Disconnected(_) => provider::DISCONNECTED,
            Self::Internal(_) => rpc::INTERNAL,
            Self::Custom { code, .. } => *code,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code() == provider::UNAUTHORIZED
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("Must call 'eth_requestAccounts' before other methods".to_owned())
    }

    pub fn invalid_request(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            data,
        }
    }

    /// Maps an error reported by a wallet backend onto the local taxonomy.
    ///
    /// Backends signal user denial only through their message text, so
    /// `denied`/`rejected` phrasing is normalised to [`ProviderError::UserRejected`].
    pub fn from_backend(code: Option<i64>, message: &str) -> Self {
        if is_rejection_message(message) {
            return Self::UserRejected(message.to_owned());
        }
        match code {
            Some(provider::UNSUPPORTED_CHAIN) => Self::UnsupportedChain,
            Some(provider::UNAUTHORIZED) => Self::Unauthorized(message.to_owned()),
            Some(provider::USER_REJECTED_REQUEST) => Self::UserRejected(message.to_owned()),
            Some(provider::DISCONNECTED) => Self::Disconnected(message.to_owned()),
            Some(code) => Self::Custom {
                code,
                message: message.to_owned(),
            },
            None => Self::Internal(message.to_owned()),
        }
    }

    /// Same as [`ProviderError::from_backend`] but with a fixed user-facing
    /// message when the backend phrasing indicates a rejection.
    pub fn from_backend_with_rejection(
        code: Option<i64>,
        message: &str,
        rejection_message: &str,
    ) -> Self {
        match Self::from_backend(code, message) {
            Self::UserRejected(_) => Self::UserRejected(rejection_message.to_owned()),
            other => other,
        }
    }

    pub fn data(&self) -> Option<Value> {
        match self {
            Self::InvalidRequest { data, .. } => data.clone(),
            _ => None,
        }
    }

    pub fn serialize(&self, method: Option<&str>) -> SerializedError {
        SerializedError::new(self, method, DEFAULT_ERROR_DOCS_URL)
    }
}

pub fn is_rejection_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("denied") || lower.contains("rejected")
}

/// Error payload crossing an untrusted channel: code and message only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

impl From<&ProviderError> for ErrorPayload {
    fn from(error: &ProviderError) -> Self {
        Self {
            code: Some(error.code()),
            message: error.to_string(),
        }
    }
}

impl From<ErrorPayload> for ProviderError {
    fn from(payload: ErrorPayload) -> Self {
        ProviderError::from_backend(payload.code, &payload.message)
    }
}

/// The shape every rejected provider request resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message} (code {code})")]
pub struct SerializedError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub doc_url: String,
}

impl SerializedError {
    pub fn new(error: &ProviderError, method: Option<&str>, docs_base: &str) -> Self {
        let code = error.code();
        let message = error.to_string();
        let data = match (error.data(), method) {
            (Some(data), _) => Some(data),
            (None, Some(method)) => Some(serde_json::json!({ "method": method })),
            (None, None) => None,
        };
        Self {
            code,
            doc_url: doc_url(docs_base, code, &message),
            message,
            data,
        }
    }
}

fn doc_url(base: &str, code: i64, message: &str) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("version", LIB_VERSION)
                .append_pair("code", &code.to_string())
                .append_pair("message", message);
            url.to_string()
        }
        Err(_) => format!("{base}?version={LIB_VERSION}&code={code}"),
    }
}
