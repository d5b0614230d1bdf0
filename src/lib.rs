//! # node-stream-rs
//!
//! Resilient streaming client for VPN node dashboards: live log tails and
//! alert feeds over WebSocket, with bounded exponential reconnection,
//! heartbeats and handshake credential injection.
//!
//! ## Example
//!
//! ```no_run
//! use node_stream_rs::{ConnectionConfig, ConnectionManager, LogTailConsumer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("wss://panel.example/api/nodes/3/logs/ws");
//!     let (manager, events) = ConnectionManager::builder(config)
//!         .credentials(Arc::new(|| std::env::var("PANEL_TOKEN").ok()))
//!         .build()?;
//!
//!     let tail = LogTailConsumer::new(manager, events, 40);
//!     let mut changes = tail.subscribe();
//!     while changes.changed().await.is_ok() {
//!         println!("[{}] {:?}", tail.status(), tail.visible_lines().last());
//!     }
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod consumers;
pub mod infrastructure;
pub mod types;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionManagerBuilder, EventReceiver, ReadyState,
};
pub use consumers::{
    AlertEvent, EventFeedConsumer, EventHistory, FeedConfig, FeedScope, LogTailConsumer,
    ViewStatus,
};
pub use infrastructure::{BackoffPolicy, CredentialSource, HttpEventHistory};
pub use types::{ConnectionEvent, FrameFormat, StreamError, StreamMessage};
pub use websocket::{Connector, TargetAddress, WebSocketConnector};
