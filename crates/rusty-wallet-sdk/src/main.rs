//! rusty-wallet-sdk: drives a provider session against the in-process loopback wallet.
//!
//! Usage: `rusty-wallet-sdk [METHOD [PARAMS_JSON]]`

use std::sync::Arc;

use eyre::WrapErr;
use serde_json::{json, Value};

use rusty_wallet_sdk_adapters::{
    LoopbackPopup, MemoryStorage, ProviderConfig, ProviderOptions, WalletProvider,
};
use rusty_wallet_sdk_core::{AppMetadata, RequestArguments};

const APP_NAME: &str = "rusty-wallet-sdk";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        build_time = env!("BUILD_TIME"),
        "Starting rusty-wallet-sdk"
    );

    let mut args = std::env::args().skip(1);
    let method = args.next();
    let params = args
        .next()
        .map(|raw| serde_json::from_str::<Value>(&raw))
        .transpose()
        .wrap_err("PARAMS_JSON is not valid JSON")?;

    let mut options = ProviderOptions::new(
        AppMetadata::new(APP_NAME).with_chain_ids(vec![1, 8453]),
        Arc::new(MemoryStorage::new()),
        Arc::new(LoopbackPopup::new()),
    );
    options.config = ProviderConfig::from_env();
    options.location = "https://localhost".to_owned();
    let provider = WalletProvider::new(options)?;

    let accounts = provider
        .request(&RequestArguments::without_params("eth_requestAccounts"))
        .await?;
    print_json(&json!({ "accounts": accounts }))?;

    if let Some(method) = method {
        let request = match params {
            Some(params) => RequestArguments::new(method, params),
            None => RequestArguments::without_params(method),
        };
        match provider.request(&request).await {
            Ok(result) => print_json(&json!({ "method": request.method, "result": result }))?,
            Err(error) => print_json(&json!({ "method": request.method, "error": error }))?,
        }
    }

    for event in provider.drain_events()? {
        tracing::info!(
            sequence = event.sequence,
            event = event.kind.event_name(),
            value = %event.value,
            "provider event"
        );
    }

    provider.disconnect().await?;
    Ok(())
}

fn print_json(value: &Value) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
