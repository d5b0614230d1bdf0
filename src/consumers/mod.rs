pub mod event_feed;
pub mod log_tail;

pub use event_feed::{
    AlertEvent, EventBuffer, EventFeedConsumer, EventHistory, FeedConfig, FeedScope, merge,
};
pub use log_tail::{LogBuffer, LogTailConsumer, TailViewport};

use crate::connection::ReadyState;

/// Connectivity indicator shown next to a stream view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewStatus {
    Connecting,
    Connected,
    Closed,
}

impl From<ReadyState> for ViewStatus {
    fn from(state: ReadyState) -> Self {
        match state {
            ReadyState::Connecting => ViewStatus::Connecting,
            ReadyState::Open => ViewStatus::Connected,
            ReadyState::Closing | ReadyState::Closed => ViewStatus::Closed,
        }
    }
}

impl std::fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ViewStatus::Connecting => "connecting",
            ViewStatus::Connected => "connected",
            ViewStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}
