use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodCategory {
    Handshake,
    Sign,
    State,
    Deprecated,
    Unsupported,
    Fetch,
}

const HANDSHAKE: &[&str] = &["eth_requestAccounts"];

const SIGN: &[&str] = &[
    "eth_ecRecover",
    "personal_sign",
    "personal_ecRecover",
    "eth_signTransaction",
    "eth_sendTransaction",
    "eth_signTypedData_v1",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
    "eth_signTypedData",
    "wallet_addEthereumChain",
    "wallet_switchEthereumChain",
    "wallet_watchAsset",
    "wallet_getCapabilities",
    "wallet_sendCalls",
    "wallet_showCallsStatus",
];

const STATE: &[&str] = &["eth_chainId", "eth_accounts", "eth_coinbase", "net_version"];

const DEPRECATED: &[&str] = &["eth_sign", "eth_signTypedData_v2"];

const UNSUPPORTED: &[&str] = &["eth_subscribe", "eth_unsubscribe"];

pub const FILTER_METHODS: &[&str] = &[
    "eth_newFilter",
    "eth_newBlockFilter",
    "eth_newPendingTransactionFilter",
    "eth_getFilterChanges",
    "eth_getFilterLogs",
    "eth_uninstallFilter",
];

/// Everything not explicitly listed is forwarded to the chain's RPC node.
pub fn determine_method_category(method: &str) -> MethodCategory {
    let tables: [(&[&str], MethodCategory); 5] = [
        (HANDSHAKE, MethodCategory::Handshake),
        (SIGN, MethodCategory::Sign),
        (STATE, MethodCategory::State),
        (DEPRECATED, MethodCategory::Deprecated),
        (UNSUPPORTED, MethodCategory::Unsupported),
    ];
    tables
        .iter()
        .find(|(names, _)| names.contains(&method))
        .map(|(_, category)| *category)
        .unwrap_or(MethodCategory::Fetch)
}

pub fn is_filter_method(method: &str) -> bool {
    FILTER_METHODS.contains(&method)
}
