/// Default base reconnect interval (milliseconds)
pub const DEFAULT_RECONNECT_INTERVAL: u64 = 3000;

/// Default upper bound for a single reconnect delay (milliseconds)
pub const DEFAULT_MAX_RECONNECT_INTERVAL: u64 = 30000;

/// Default number of automatic reconnect attempts before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 25;

/// Default heartbeat interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 30000;

/// Default heartbeat payload and the acknowledgement the node answers with
pub const HEARTBEAT_MESSAGE: &str = "ping";
pub const HEARTBEAT_ACK: &str = "pong";

/// Fraction of the raw backoff delay drawn as jitter
pub const BACKOFF_JITTER_RATIO: f64 = 0.3;

/// Delay between tearing down and re-opening on a manual reconnect (milliseconds)
pub const MANUAL_RECONNECT_DELAY: u64 = 100;

/// Upper bound on writing the close frame during a disconnect (milliseconds)
pub const CLOSE_FRAME_TIMEOUT: u64 = 5000;

/// Prefix of the synthesized sub-protocol carrying the bearer credential
pub const BEARER_PROTOCOL_PREFIX: &str = "bearer.";

/// Maximum number of lines kept by a log tail
pub const MAX_LOG_LINES: usize = 200;

/// Event feed caps for the multi-node and single-node views
pub const AGGREGATE_FEED_CAP: usize = 50;
pub const NODE_FEED_CAP: usize = 20;

/// Default event history poll interval (milliseconds)
pub const EVENT_POLL_INTERVAL: u64 = 30000;

/// Default look-back window for event history polls (milliseconds)
pub const EVENT_HISTORY_WINDOW: u64 = 24 * 60 * 60 * 1000;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;
pub const WS_CLOSE_NO_STATUS: u16 = 1005;
pub const WS_CLOSE_ABNORMAL: u16 = 1006;
