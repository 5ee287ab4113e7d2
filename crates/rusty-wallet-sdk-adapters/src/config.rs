use rusty_wallet_sdk_core::DEFAULT_ERROR_DOCS_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProfile {
    Development,
    Production,
}

impl RuntimeProfile {
    fn from_env_value(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub keys_url: String,
    pub walletlink_url: String,
    pub popup_width: u32,
    pub popup_height: u32,
    pub storage_namespace: String,
    pub filter_timeout_ms: u64,
    pub block_height_throttle_ms: u64,
    pub rpc_timeout_ms: u64,
    pub error_docs_url: String,
    pub runtime_profile: RuntimeProfile,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            keys_url: "https://keys.coinbase.com/connect".to_owned(),
            walletlink_url: "https://www.walletlink.org".to_owned(),
            popup_width: 420,
            popup_height: 540,
            storage_namespace: "CBWSDK".to_owned(),
            filter_timeout_ms: 5 * 60 * 1000,
            block_height_throttle_ms: 1_000,
            rpc_timeout_ms: 15_000,
            error_docs_url: DEFAULT_ERROR_DOCS_URL.to_owned(),
            runtime_profile: RuntimeProfile::Development,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("WALLET_SDK_KEYS_URL") {
            if !url.trim().is_empty() {
                config.keys_url = url;
            }
        }
        if let Ok(url) = std::env::var("WALLET_SDK_WALLETLINK_URL") {
            if !url.trim().is_empty() {
                config.walletlink_url = url;
            }
        }
        if let Some(ms) = env_millis("WALLET_SDK_RPC_TIMEOUT_MS") {
            config.rpc_timeout_ms = ms;
        }
        if let Some(ms) = env_millis("WALLET_SDK_FILTER_TIMEOUT_MS") {
            config.filter_timeout_ms = ms;
        }
        if let Ok(profile) = std::env::var("WALLET_SDK_PROFILE") {
            config.runtime_profile = RuntimeProfile::from_env_value(&profile);
        }
        config
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }
}

fn env_millis(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}
