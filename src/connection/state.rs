use crate::infrastructure::TaskSlot;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Coarse lifecycle phase of one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Inputs to the ready-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new handshake is starting
    Connect,
    HandshakeSucceeded,
    HandshakeFailed,
    /// The transport ended without an explicit disconnect
    TransportClosed,
    /// The owner asked to disconnect
    Disconnect,
    /// The normal-closure frame of a disconnect has been written
    CloseCompleted,
}

impl ReadyState {
    /// The state after `transition`, or `None` when it does not apply here.
    pub fn next(self, transition: Transition) -> Option<ReadyState> {
        use ReadyState::*;
        use Transition::*;

        match (self, transition) {
            (Closed | Closing, Connect) => Some(Connecting),
            (Connecting | Open, Connect) => None,

            (Connecting, HandshakeSucceeded) => Some(Open),
            (Open | Closing | Closed, HandshakeSucceeded) => None,

            (Connecting, HandshakeFailed) => Some(Closed),
            (Open | Closing | Closed, HandshakeFailed) => None,

            (Connecting | Open | Closing, TransportClosed) => Some(Closed),
            (Closed, TransportClosed) => None,

            (Open, Disconnect) => Some(Closing),
            (Connecting, Disconnect) => Some(Closed),
            (Closing | Closed, Disconnect) => None,

            (Closing, CloseCompleted) => Some(Closed),
            (Connecting | Open | Closed, CloseCompleted) => None,
        }
    }
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Commands for the task that owns the transport.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Message),
    Close { code: u16, reason: String },
}

/// Mutable state of one manager, guarded by a single lock.
///
/// Timer and session handles live here and nowhere else, so tearing down one
/// manager cannot touch another manager's timers.
pub(crate) struct ConnectionState {
    pub ready: ReadyState,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Cleared by an explicit disconnect and by exhaustion
    pub reconnect_enabled: bool,
    /// Incremented for every handshake and every teardown; background tasks
    /// carrying an older value are stale and must not act
    pub generation: u64,
    /// Session whose normal-closure frame is still being written
    pub closing_session: Option<u64>,
    pub outbound: Option<mpsc::UnboundedSender<Outbound>>,
    pub session: TaskSlot,
    pub reconnect_timer: TaskSlot,
    pub heartbeat_timer: TaskSlot,
}

impl ConnectionState {
    pub fn new(reconnect_enabled: bool) -> Self {
        Self {
            ready: ReadyState::Closed,
            attempts: 0,
            last_error: None,
            reconnect_enabled,
            generation: 0,
            closing_session: None,
            outbound: None,
            session: TaskSlot::new(),
            reconnect_timer: TaskSlot::new(),
            heartbeat_timer: TaskSlot::new(),
        }
    }

    /// Invalidate every task of the current session and return the new generation
    pub fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Cancel both timers
    pub fn clear_timers(&mut self) {
        self.reconnect_timer.cancel();
        self.heartbeat_timer.cancel();
    }
}
