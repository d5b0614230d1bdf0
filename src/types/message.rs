use super::error::StreamError;
use serde::{Deserialize, Serialize};

/// How the manager interprets inbound text frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// Opaque text lines (log tailing)
    #[default]
    Text,
    /// JSON-encoded records (event feeds)
    Json,
}

/// The unit delivered to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A raw text frame, e.g. one log line
    Text(String),
    /// A decoded structured frame
    Structured(serde_json::Value),
}

impl StreamMessage {
    /// Decodes a text frame according to `format`.
    pub fn decode(text: &str, format: FrameFormat) -> Result<Self, StreamError> {
        match format {
            FrameFormat::Text => Ok(Self::Text(text.to_string())),
            FrameFormat::Json => serde_json::from_str(text)
                .map(Self::Structured)
                .map_err(StreamError::Decode),
        }
    }

    /// Returns the text content of a raw frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// Returns the decoded value of a structured frame.
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Text(_) => None,
            Self::Structured(value) => Some(value),
        }
    }
}

/// Lifecycle notifications emitted by a [`ConnectionManager`](crate::ConnectionManager).
///
/// Events are pushed onto an unbounded channel, so emitting never blocks the
/// state machine.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The handshake completed and the connection is open
    Open,
    /// A frame arrived on the open connection
    Message(StreamMessage),
    /// The connection closed, with the close code and reason
    Close { code: u16, reason: String },
    /// A non-fatal failure (handshake, transport, send, encode, decode)
    Error(StreamError),
    /// Automatic reconnection gave up after `attempts` attempts
    ReconnectExhausted { attempts: u32 },
}
