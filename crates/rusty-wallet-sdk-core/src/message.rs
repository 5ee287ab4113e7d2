use std::collections::BTreeMap;
use std::fmt;

use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::domain::{AppMetadata, Preference, RequestArguments};
use crate::error::ErrorPayload;

/// Correlation id of a popup message, carried as a string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => s
                .parse()
                .map(Self)
                .map_err(|e| serde::de::Error::custom(format!("invalid message id {s}: {e}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopupEvent {
    PopupLoaded,
    PopupUnload,
    #[serde(rename = "selectSignerType")]
    SelectSignerType,
    WalletLinkSessionRequest,
    WalletLinkUpdate,
    #[serde(rename = "handshake")]
    Handshake,
    #[serde(rename = "request")]
    Request,
    #[serde(rename = "response")]
    Response,
    #[serde(rename = "update")]
    Update,
    #[serde(other)]
    Unknown,
}

/// Envelope exchanged with the popup window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<MessageId>,
    pub event: PopupEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl PopupMessage {
    pub fn new(event: PopupEvent, data: Value) -> Self {
        Self {
            id: None,
            request_id: None,
            event,
            sender: None,
            data,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn response_to(request_id: MessageId, data: Value) -> Self {
        Self {
            id: None,
            request_id: Some(request_id),
            event: PopupEvent::Response,
            sender: None,
            data,
        }
    }
}

/// A raw message delivered by the window layer, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub origin: String,
    pub from_popup: bool,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedData {
    pub iv: Bytes,
    pub cipher_text: Bytes,
}

/// Reply to the popup's `PopupLoaded` announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupConfig {
    pub version: String,
    pub metadata: AppMetadata,
    pub preference: Preference,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcResult {
    Value(Value),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScwHandshakeRequest {
    pub method: String,
    pub params: AppMetadata,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScwResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<BTreeMap<u64, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
}

/// Decrypted body of a smart-wallet response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScwResponse {
    pub result: RpcResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScwResponseData>,
}

/// Decrypted body of a smart-wallet request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScwRequest {
    pub action: RequestArguments,
    pub chain_id: u64,
}

/// Decrypted body of an unsolicited smart-wallet update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScwUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<Address>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScwResponseData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLinkSessionInfo {
    pub id: String,
    pub secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_accepts_string_or_number() {
        let a: MessageId = serde_json::from_value(serde_json::json!("42")).expect("string id");
        let b: MessageId = serde_json::from_value(serde_json::json!(42)).expect("numeric id");
        assert_eq!(a, b);
        assert_eq!(serde_json::to_value(a).expect("encode"), serde_json::json!("42"));
    }

    #[test]
    fn unknown_events_parse() {
        let msg: PopupMessage =
            serde_json::from_value(serde_json::json!({"event": "somethingElse"})).expect("parse");
        assert_eq!(msg.event, PopupEvent::Unknown);
    }
}
