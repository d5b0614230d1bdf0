use std::sync::Weak;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time;

/// Result of a single heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// The payload was handed to the transport
    Sent,
    /// The connection is not open right now; try again next tick
    Skipped,
    /// The session this scheduler belongs to is gone
    Stale,
}

/// Something a heartbeat can be sent through.
pub trait HeartbeatTarget: Send + Sync + 'static {
    /// Send `payload` if session `generation` is still current and open.
    fn beat(&self, generation: u64, payload: &str) -> Beat;
}

/// Periodic liveness pings for one open session.
///
/// Each tick sleeps for the interval and then re-arms itself, so aborting the
/// returned handle is the only cancellation point.
pub struct HeartbeatScheduler {
    interval: Duration,
    payload: String,
}

impl HeartbeatScheduler {
    pub fn new(interval: Duration, payload: impl Into<String>) -> Self {
        Self {
            interval,
            payload: payload.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Spawns the heartbeat task for session `generation`.
    ///
    /// Returns `None` when the interval is zero.
    pub fn spawn<T: HeartbeatTarget>(
        self,
        runtime: &Handle,
        target: Weak<T>,
        generation: u64,
    ) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }

        Some(runtime.spawn(async move {
            loop {
                time::sleep(self.interval).await;

                // Manager dropped, exit heartbeat task
                let Some(target) = target.upgrade() else {
                    break;
                };

                match target.beat(generation, &self.payload) {
                    Beat::Sent => tracing::debug!("Sent heartbeat for session {}", generation),
                    Beat::Skipped => {
                        tracing::debug!("Connection not open, skipping heartbeat")
                    }
                    Beat::Stale => break,
                }
            }
        }))
    }
}
