use crate::infrastructure::BackoffPolicy;
use crate::types::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MAX_RECONNECT_INTERVAL, DEFAULT_RECONNECT_INTERVAL,
    FrameFormat, HEARTBEAT_ACK, HEARTBEAT_INTERVAL, HEARTBEAT_MESSAGE, Result, StreamError,
};
use crate::websocket::TargetAddress;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable parameters of one logical connection.
///
/// Intervals are in milliseconds. Missing fields take their defaults when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Stream target (`ws://` or `wss://`)
    pub url: String,
    /// Whether to reconnect automatically after a failure
    pub reconnect: bool,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_interval_ms: u64,
    pub exponential_backoff: bool,
    pub max_reconnect_attempts: u32,
    /// `0` disables the heartbeat
    pub heartbeat_interval_ms: u64,
    pub heartbeat_message: String,
    /// Frames equal to this are heartbeat replies and are not delivered
    pub heartbeat_ack: Option<String>,
    /// Whether to attach the bearer credential to the handshake
    pub inject_credential: bool,
    /// Application sub-protocols, in preference order
    pub protocols: Vec<String>,
    pub frame_format: FrameFormat,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: true,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_interval_ms: DEFAULT_MAX_RECONNECT_INTERVAL,
            exponential_backoff: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL,
            heartbeat_message: HEARTBEAT_MESSAGE.to_string(),
            heartbeat_ack: Some(HEARTBEAT_ACK.to_string()),
            inject_credential: true,
            protocols: Vec::new(),
            frame_format: FrameFormat::Text,
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_frame_format(mut self, format: FrameFormat) -> Self {
        self.frame_format = format;
        self
    }

    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reconnect_intervals(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.reconnect_interval_ms = base_ms;
        self.max_reconnect_interval_ms = max_ms;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    /// Check the invariants and the target address.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_interval_ms > self.max_reconnect_interval_ms {
            return Err(StreamError::Config(format!(
                "reconnect interval {}ms exceeds the maximum of {}ms",
                self.reconnect_interval_ms, self.max_reconnect_interval_ms
            )));
        }
        if self.heartbeat_interval_ms > 0 && self.heartbeat_message.is_empty() {
            return Err(StreamError::Config(
                "heartbeat message must not be empty".to_string(),
            ));
        }

        TargetAddress::parse(&self.url)?;
        Ok(())
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_interval_ms),
            Duration::from_millis(self.max_reconnect_interval_ms),
            self.exponential_backoff,
        )
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}
