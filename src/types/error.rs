use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors produced by the streaming client.
///
/// Only construction-time failures are returned to the caller. Everything that
/// happens after a manager exists is delivered as a
/// [`ConnectionEvent::Error`](crate::ConnectionEvent::Error).
#[derive(Error, Debug)]
pub enum StreamError {
    /// WebSocket protocol error (invalid frame, I/O failure mid-stream, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The connection could not be established
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The connection was open and ended without an explicit disconnect
    #[error("Connection error: {0}")]
    Connection(String),

    /// An outbound structured message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound structured frame did not deserialize
    #[error("Failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// HTTP request error (event history polling)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed target address)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid connection or feed configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Attempted to send while the connection is not open
    #[error("Not connected")]
    NotConnected,
}

/// Convenience type alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
