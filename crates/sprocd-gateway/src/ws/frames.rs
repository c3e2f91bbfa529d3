//! JSON frames exchanged on `/ws`.
//!
//! A client sends `req` frames naming one of `start`, `cancel`, `databases`
//! or `lineages` and gets a `res` frame carrying the same `id`. Every status
//! event is pushed unsolicited as an `event` frame on the `sp-status` channel,
//! or `sp-tarih` for last-activity stamps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ "type": "req", "id": "7", "method": "start" }`. No current method
/// reads `params`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Answer to a [`ReqFrame`]: `payload` on success, `error` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

/// `code` is machine-readable (`UNKNOWN_METHOD`), `message` is for people.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ResFrame {
    pub fn ok(id: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: &str, message: &str) -> Self {
        Self {
            frame_type: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorShape {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// A status event pushed to every connected client. `payload` is the
/// serialized `StatusEvent`; `seq` increases across all connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: String,
    pub payload: Value,
    pub seq: u64,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: impl Serialize, seq: u64) -> Self {
        Self {
            frame_type: "event".to_string(),
            event: event.into(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            seq,
        }
    }
}
