//! Frames exchanged with the browser-extension bridge peer.
//!
//! Every frame is a JSON object discriminated by its `type` field:
//!
//! - `chat_message`: chat lines, `data` is one `{username, message}` object
//!   or an array of them. Sent in both directions.
//! - `queryStatus`: liveness probe from the peer, answered with `pong`.
//! - `debug`: free-form diagnostic text from the peer, logged only.

use serde::{Deserialize, Serialize};

pub const TYPE_CHAT_MESSAGE: &str = "chat_message";
pub const TYPE_QUERY_STATUS: &str = "queryStatus";
pub const TYPE_DEBUG: &str = "debug";
pub const TYPE_PONG: &str = "pong";

/// WebSocket message limit for bridge peers (64 MiB). Batched
/// `chat_message` frames of any realistic size fit; only a message past this
/// makes the WebSocket layer close the connection.
pub const MAX_MESSAGE_BYTES: usize = 64 << 20;

/// A single chat line as the extension encodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeChat {
    pub username: String,
    #[serde(default)]
    pub message: String,
}

/// `data` of a `chat_message` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatPayload {
    Many(Vec<BridgeChat>),
    One(BridgeChat),
}

impl ChatPayload {
    pub fn into_vec(self) -> Vec<BridgeChat> {
        match self {
            Self::Many(v) => v,
            Self::One(c) => vec![c],
        }
    }
}

/// Frames the bridge accepts from the peer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundFrame {
    #[serde(rename = "chat_message")]
    ChatMessage {
        #[serde(default)]
        channel: Option<String>,
        #[serde(alias = "payload")]
        data: ChatPayload,
    },
    #[serde(rename = "queryStatus")]
    QueryStatus,
    #[serde(rename = "debug")]
    Debug {
        #[serde(default)]
        message: serde_json::Value,
    },
}

/// Frames the bridge sends to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "chat_message")]
    ChatMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        platform: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        data: BridgeChat,
    },
    #[serde(rename = "pong")]
    Pong,
}

impl OutboundFrame {
    pub fn to_json(&self) -> String {
        // Only string keys and owned strings: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Why an inbound frame was rejected. The connection stays open either way.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unrecognized frame type `{0}`")]
    UnknownType(String),
    #[error("malformed `{kind}` frame: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one text frame from the peer.
///
/// Distinguishes non-JSON input, unknown frame types and malformed known
/// frames so the caller can log a precise diagnostic.
pub fn parse_inbound(text: &str) -> Result<InboundFrame, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(FrameError::NotJson)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();
    match kind.as_str() {
        TYPE_CHAT_MESSAGE | TYPE_QUERY_STATUS | TYPE_DEBUG => {
            serde_json::from_value(value).map_err(|source| FrameError::Invalid { kind, source })
        },
        _ => Err(FrameError::UnknownType(kind)),
    }
}

/// Render a `debug` frame's message for logging.
pub fn debug_text(message: &serde_json::Value) -> String {
    match message {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
