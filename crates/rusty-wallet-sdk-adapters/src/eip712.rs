//! Typed-data digests for the legacy relay signing methods.

use alloy::dyn_abi::{DynSolType, DynSolValue, TypedData};
use alloy::primitives::{keccak256, B256};
use serde_json::Value;

use rusty_wallet_sdk_core::ProviderError;

#[derive(serde::Deserialize)]
struct LegacyField {
    #[serde(rename = "type")]
    ty: String,
    name: String,
    value: Value,
}

/// `eth_signTypedData_v1`: keccak over the packed schema hash and the packed
/// value hash of a `[{type, name, value}]` list.
pub fn hash_legacy(data: &Value) -> Result<B256, ProviderError> {
    let fields: Vec<LegacyField> = serde_json::from_value(data.clone())
        .map_err(|e| ProviderError::InvalidParams(format!("invalid legacy typed data: {e}")))?;
    if fields.is_empty() {
        return Err(ProviderError::InvalidParams(
            "legacy typed data must not be empty".to_owned(),
        ));
    }

    let mut schema = Vec::new();
    let mut values = Vec::new();
    for field in &fields {
        schema.extend_from_slice(format!("{} {}", field.ty, field.name).as_bytes());
        let ty: DynSolType = field
            .ty
            .parse()
            .map_err(|e| ProviderError::InvalidParams(format!("unknown type {}: {e}", field.ty)))?;
        let value: DynSolValue = ty.coerce_json(&field.value).map_err(|e| {
            ProviderError::InvalidParams(format!("invalid value for {}: {e}", field.name))
        })?;
        values.extend_from_slice(&value.abi_encode_packed());
    }

    let mut outer = Vec::with_capacity(64);
    outer.extend_from_slice(keccak256(&schema).as_slice());
    outer.extend_from_slice(keccak256(&values).as_slice());
    Ok(keccak256(&outer))
}

/// `eth_signTypedData_v3`; the encoding coincides with v4 for every
/// structure v3 accepts.
pub fn hash_v3(data: &Value) -> Result<B256, ProviderError> {
    hash_v4(data)
}

/// `eth_signTypedData_v4`: the EIP-712 signing hash.
pub fn hash_v4(data: &Value) -> Result<B256, ProviderError> {
    let typed: TypedData = serde_json::from_value(data.clone())
        .map_err(|e| ProviderError::InvalidParams(format!("invalid typed data: {e}")))?;
    typed
        .eip712_signing_hash()
        .map_err(|e| ProviderError::InvalidParams(format!("typed data hashing failed: {e}")))
}
