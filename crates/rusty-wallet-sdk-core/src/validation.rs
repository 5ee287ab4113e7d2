use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;

use crate::error::ProviderError;

fn strip_0x(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

pub fn is_hex_string(raw: &str) -> bool {
    strip_0x(raw).chars().all(|c| c.is_ascii_hexdigit())
}

fn even_length_hex(raw: &str) -> String {
    let s = strip_0x(raw).to_ascii_lowercase();
    if s.len() % 2 == 1 {
        format!("0{s}")
    } else {
        s
    }
}

pub fn hex_string_from_int(value: u64) -> String {
    format!("{value:#x}")
}

pub fn ensure_address(value: &Value) -> Result<Address, ProviderError> {
    value
        .as_str()
        .filter(|s| strip_0x(s).len() == 40 && is_hex_string(s))
        .and_then(|s| s.parse::<Address>().ok())
        .ok_or_else(|| ProviderError::InvalidParams(format!("Invalid Ethereum address: {value}")))
}

/// Hex strings decode to their bytes, anything else is taken as utf-8 text.
pub fn ensure_buffer(value: &Value) -> Result<Bytes, ProviderError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidParams(format!("Not binary data: {value}")))?;
    if is_hex_string(raw) {
        let bytes = alloy::hex::decode(even_length_hex(raw))
            .map_err(|e| ProviderError::InvalidParams(format!("invalid hex data: {e}")))?;
        return Ok(Bytes::from(bytes));
    }
    Ok(Bytes::copy_from_slice(raw.as_bytes()))
}

pub fn ensure_int_number(value: &Value) -> Result<u64, ProviderError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let raw = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidParams(format!("Not an integer: {value}")))?;
    if raw.chars().all(|c| c.is_ascii_digit()) {
        if raw.is_empty() {
            return Ok(0);
        }
        return raw
            .parse()
            .map_err(|e| ProviderError::InvalidParams(format!("Not an integer: {raw}: {e}")));
    }
    if is_hex_string(raw) {
        return u64::from_str_radix(&even_length_hex(raw), 16)
            .map_err(|e| ProviderError::InvalidParams(format!("Not an integer: {raw}: {e}")));
    }
    Err(ProviderError::InvalidParams(format!("Not an integer: {raw}")))
}

pub fn ensure_big_int(value: &Value) -> Result<U256, ProviderError> {
    if let Some(n) = value.as_u64() {
        return Ok(U256::from(n));
    }
    let raw = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidParams(format!("Not an integer: {value}")))?;
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        return U256::from_str_radix(raw, 10)
            .map_err(|e| ProviderError::InvalidParams(format!("Not an integer: {raw}: {e}")));
    }
    if is_hex_string(raw) {
        let hex = even_length_hex(raw);
        if hex.is_empty() {
            return Ok(U256::ZERO);
        }
        return U256::from_str_radix(&hex, 16)
            .map_err(|e| ProviderError::InvalidParams(format!("Not an integer: {raw}: {e}")));
    }
    Err(ProviderError::InvalidParams(format!("Not an integer: {raw}")))
}

/// Accepts either a JSON object or its string encoding.
pub fn ensure_parsed_json_object(value: &Value) -> Result<Value, ProviderError> {
    match value {
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            ProviderError::InvalidParams(format!("Not a JSON string or an object: {e}"))
        }),
        Value::Object(_) | Value::Array(_) => Ok(value.clone()),
        other => Err(ProviderError::InvalidParams(format!(
            "Not a JSON string or an object: {other}"
        ))),
    }
}

pub fn json_chain_id_to_u64(value: &Value) -> Result<u64, ProviderError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidParams("chain id must be string or number".to_owned()))?;
    parse_chain_id_str(s)
}

/// `0x`-prefixed ids are hex, everything else decimal.
pub fn parse_chain_id_str(raw: &str) -> Result<u64, ProviderError> {
    if raw.starts_with("0x") || raw.starts_with("0X") {
        u64::from_str_radix(strip_0x(raw), 16)
            .map_err(|e| ProviderError::InvalidParams(format!("invalid hex chain id: {e}")))
    } else {
        raw.parse()
            .map_err(|e| ProviderError::InvalidParams(format!("invalid chain id: {e}")))
    }
}
