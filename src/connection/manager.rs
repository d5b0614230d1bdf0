use super::builder::ConnectionManagerBuilder;
use super::config::ConnectionConfig;
use super::state::{ConnectionState, Outbound, ReadyState, Transition};
use crate::infrastructure::{
    BackoffPolicy, Beat, CredentialInjector, CredentialStatus, HeartbeatScheduler,
    HeartbeatTarget,
};
use crate::types::{
    CLOSE_FRAME_TIMEOUT, ConnectionEvent, MANUAL_RECONNECT_DELAY, Result, StreamError,
    StreamMessage, WS_CLOSE_ABNORMAL, WS_CLOSE_NO_STATUS, WS_CLOSE_NORMAL,
};
use crate::websocket::{Connector, HandshakeRequest, Transport};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Receiving end of a manager's lifecycle events.
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

const DISCONNECT_REASON: &str = "disconnected by client";

/// Owns one logical streaming connection.
///
/// `ConnectionManager` drives the handshake, keeps the connection alive with
/// heartbeats, and reconnects with jittered exponential backoff until
/// `max_reconnect_attempts` is exhausted. None of its methods block or return
/// runtime failures; outcomes arrive on the [`EventReceiver`] handed out by
/// the builder.
///
/// Dropping the manager is equivalent to [`disconnect()`](Self::disconnect):
/// pending reconnect and heartbeat timers are cancelled before `drop` returns.
///
/// # Example
///
/// ```no_run
/// use node_stream_rs::{ConnectionConfig, ConnectionEvent, ConnectionManager};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConnectionConfig::new("wss://panel.example/api/nodes/3/logs/ws");
/// let (manager, mut events) = ConnectionManager::builder(config)
///     .credentials(Arc::new(|| Some("session-token".to_string())))
///     .build()?;
///
/// manager.connect();
/// while let Some(event) = events.recv().await {
///     if let ConnectionEvent::Message(message) = event {
///         println!("{:?}", message);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: ConnectionConfig,
    backoff: BackoffPolicy,
    connector: Arc<dyn Connector>,
    credentials: CredentialInjector,
    runtime: Handle,
    state: Mutex<ConnectionState>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    ready: Arc<watch::Sender<ReadyState>>,
}

/// How a session's transport loop ended.
enum SessionEnd {
    HandshakeFailed(StreamError),
    /// The peer closed the connection or the stream ended
    Remote { code: u16, reason: String },
    /// Reading or writing failed mid-stream
    Failed(StreamError),
}

impl ConnectionManager {
    /// Start building a manager for `config`.
    pub fn builder(config: ConnectionConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(config)
    }

    /// Build a manager with the WebSocket connector and no credentials.
    pub fn new(config: ConnectionConfig) -> Result<(Self, EventReceiver)> {
        ConnectionManagerBuilder::new(config).build()
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Begin a handshake against the configured target.
    ///
    /// Does nothing while the connection is open or a handshake is already in
    /// flight. Re-enables automatic reconnection after an earlier
    /// [`disconnect()`](Self::disconnect).
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Send a raw text frame.
    ///
    /// Returns `true` when the frame was handed to the transport. Otherwise a
    /// [`StreamError::NotConnected`] event is emitted; frames are never queued
    /// for a later connection.
    pub fn send(&self, message: impl Into<String>) -> bool {
        self.inner.send(message.into())
    }

    /// Serialize `value` to JSON and send it.
    ///
    /// An encoding failure is reported as a [`StreamError::Serialization`]
    /// event and leaves the connection open.
    pub fn send_structured<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.inner.send(text),
            Err(err) => {
                tracing::warn!("Failed to serialize outbound message: {}", err);
                let state = self.inner.lock();
                self.inner.record_error(state, StreamError::Serialization(err));
                false
            }
        }
    }

    /// Close the connection with a normal-closure code and stop reconnecting.
    ///
    /// Safe to call in any state. Timers are cancelled before this returns.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Reset the attempt counter and force a fresh disconnect/connect cycle.
    ///
    /// The new handshake starts after a short delay so the previous socket can
    /// finish closing.
    pub fn manual_reconnect(&self) {
        self.inner.manual_reconnect();
    }

    /// Point the manager at a new target.
    ///
    /// The current connection is torn down, a fresh connection state is created
    /// for `url` and a handshake is started. Events keep arriving on the same
    /// receiver.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the current connection untouched, if `url` is
    /// not a valid stream target.
    pub fn retarget(&mut self, url: impl Into<String>) -> Result<()> {
        let mut config = self.inner.config.clone();
        config.url = url.into();
        config.validate()?;

        tracing::info!("Retargeting stream from {} to {}", self.inner.config.url, config.url);
        self.inner.disconnect();

        let inner = Inner::with_channels(
            config,
            Arc::clone(&self.inner.connector),
            self.inner.credentials.clone(),
            self.inner.runtime.clone(),
            self.inner.events.clone(),
            Arc::clone(&self.inner.ready),
        );
        self.inner = inner;
        self.inner.connect();
        Ok(())
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.lock().ready
    }

    /// Observe ready-state changes.
    pub fn watch_state(&self) -> watch::Receiver<ReadyState> {
        self.inner.ready.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Reconnect attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Runtime the manager was built on; companion tasks are spawned here.
    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    #[cfg(test)]
    fn has_pending_reconnect(&self) -> bool {
        self.inner.lock().reconnect_timer.is_pending()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.disconnect();
    }
}

impl Inner {
    pub(crate) fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        credentials: CredentialInjector,
        runtime: Handle,
    ) -> (Arc<Self>, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, _) = watch::channel(ReadyState::Closed);
        let inner = Self::with_channels(
            config,
            connector,
            credentials,
            runtime,
            events_tx,
            Arc::new(ready_tx),
        );
        (inner, events_rx)
    }

    fn with_channels(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        credentials: CredentialInjector,
        runtime: Handle,
        events: mpsc::UnboundedSender<ConnectionEvent>,
        ready: Arc<watch::Sender<ReadyState>>,
    ) -> Arc<Self> {
        ready.send_replace(ReadyState::Closed);
        Arc::new(Self {
            backoff: config.backoff(),
            state: Mutex::new(ConnectionState::new(config.reconnect)),
            config,
            connector,
            credentials,
            runtime,
            events,
            ready,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped, discarding connection event");
        }
    }

    fn record_error(&self, mut state: MutexGuard<'_, ConnectionState>, err: StreamError) {
        state.last_error = Some(err.to_string());
        self.emit(ConnectionEvent::Error(err));
    }

    /// Apply `transition`, publishing the new state. Returns whether it applied.
    fn apply(&self, state: &mut ConnectionState, transition: Transition) -> bool {
        match state.ready.next(transition) {
            Some(next) => {
                tracing::debug!("Ready state {} -> {} ({:?})", state.ready, next, transition);
                state.ready = next;
                self.ready.send_replace(next);
                true
            }
            None => false,
        }
    }

    fn connect(self: &Arc<Self>) {
        let mut state = self.lock();
        state.reconnect_enabled = self.config.reconnect;

        if matches!(state.ready, ReadyState::Open | ReadyState::Connecting) {
            tracing::debug!("Already {}, ignoring connect", state.ready);
            return;
        }
        self.begin_connect(&mut state);
    }

    fn begin_connect(self: &Arc<Self>, state: &mut ConnectionState) {
        if !self.apply(state, Transition::Connect) {
            return;
        }

        let generation = state.advance_generation();
        state.clear_timers();
        state.closing_session = None;

        // Re-read on every attempt so a rotated token is picked up
        let (protocols, credential) = self
            .credentials
            .protocols(&self.config.protocols, self.config.inject_credential);
        if credential == CredentialStatus::Attached {
            tracing::debug!("Attached bearer credential to handshake");
        }

        let request = HandshakeRequest {
            url: self.config.url.clone(),
            protocols,
        };
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        state.outbound = Some(outbound_tx);

        tracing::info!("Connecting to {} (session {})", self.config.url, generation);
        let session = run_session(
            Arc::downgrade(self),
            Arc::clone(&self.connector),
            self.events.clone(),
            generation,
            request,
            outbound_rx,
        );
        state.session.replace(self.runtime.spawn(session));
    }

    fn on_open(self: &Arc<Self>, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation || !self.apply(&mut state, Transition::HandshakeSucceeded)
        {
            return false;
        }

        state.attempts = 0;
        state.last_error = None;

        let heartbeat = HeartbeatScheduler::new(
            self.config.heartbeat_interval(),
            self.config.heartbeat_message.clone(),
        );
        if let Some(handle) = heartbeat.spawn(&self.runtime, Arc::downgrade(self), generation) {
            state.heartbeat_timer.replace(handle);
        }

        tracing::info!("Connected to {}", self.config.url);
        self.emit(ConnectionEvent::Open);
        true
    }

    fn deliver(&self, generation: u64, text: &str) {
        let state = self.lock();
        if state.generation != generation {
            return;
        }

        if self.config.heartbeat_ack.as_deref() == Some(text) {
            tracing::debug!("Received heartbeat ack");
            return;
        }

        match StreamMessage::decode(text, self.config.frame_format) {
            Ok(message) => self.emit(ConnectionEvent::Message(message)),
            Err(err) => {
                tracing::warn!("Dropping undecodable frame: {}", err);
                self.record_error(state, err);
            }
        }
    }

    fn on_session_end(self: &Arc<Self>, generation: u64, end: SessionEnd) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }

        state.heartbeat_timer.cancel();
        state.outbound = None;
        // This session is the caller and is about to finish on its own
        state.session.detach();

        match end {
            SessionEnd::HandshakeFailed(err) => {
                self.apply(&mut state, Transition::HandshakeFailed);
                tracing::warn!("Handshake with {} failed: {}", self.config.url, err);
                state.last_error = Some(err.to_string());
                self.emit(ConnectionEvent::Error(err));
            }
            SessionEnd::Remote { code, reason } => {
                self.apply(&mut state, Transition::TransportClosed);
                tracing::warn!(
                    "Server closed connection: code={}, reason='{}'",
                    code,
                    reason
                );
                state.last_error = Some(format!("connection closed with code {}", code));
                self.emit(ConnectionEvent::Close { code, reason });
            }
            SessionEnd::Failed(err) => {
                self.apply(&mut state, Transition::TransportClosed);
                tracing::error!("Connection to {} failed: {}", self.config.url, err);
                let reason = err.to_string();
                state.last_error = Some(reason.clone());
                self.emit(ConnectionEvent::Error(err));
                self.emit(ConnectionEvent::Close {
                    code: WS_CLOSE_ABNORMAL,
                    reason,
                });
            }
        }

        self.schedule_reconnect(&mut state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ConnectionState) {
        if !self.config.reconnect || !state.reconnect_enabled {
            tracing::debug!("Automatic reconnection disabled, staying closed");
            return;
        }

        if state.attempts >= self.config.max_reconnect_attempts {
            state.reconnect_enabled = false;
            tracing::warn!(
                "Giving up on {} after {} reconnect attempts",
                self.config.url,
                state.attempts
            );
            self.emit(ConnectionEvent::ReconnectExhausted {
                attempts: state.attempts,
            });
            return;
        }

        let delay = self.backoff.delay(state.attempts);
        state.attempts += 1;
        tracing::info!(
            "Reconnecting to {} in {:?} (attempt {}/{})",
            self.config.url,
            delay,
            state.attempts,
            self.config.max_reconnect_attempts
        );
        self.schedule_connect(state, delay);
    }

    /// Arm the reconnect timer to start a handshake after `delay`.
    fn schedule_connect(self: &Arc<Self>, state: &mut ConnectionState, delay: Duration) {
        let generation = state.generation;
        let inner = Arc::downgrade(self);
        state.reconnect_timer.replace(self.runtime.spawn(async move {
            time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.reconnect_due(generation);
            }
        }));
    }

    fn reconnect_due(self: &Arc<Self>, generation: u64) {
        let mut state = self.lock();
        // A disconnect or an explicit connect happened since this was armed
        if state.generation != generation {
            return;
        }

        state.reconnect_timer.detach();
        self.begin_connect(&mut state);
    }

    fn send(&self, text: String) -> bool {
        let state = self.lock();
        if state.ready == ReadyState::Open
            && let Some(outbound) = &state.outbound
            && outbound
                .send(Outbound::Frame(Message::text(text)))
                .is_ok()
        {
            return true;
        }

        tracing::debug!("Dropping outbound frame, connection is {}", state.ready);
        self.record_error(state, StreamError::NotConnected);
        false
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        state.reconnect_enabled = false;
        self.teardown(&mut state, DISCONNECT_REASON);
    }

    fn manual_reconnect(self: &Arc<Self>) {
        let mut state = self.lock();
        tracing::info!("Manual reconnect requested for {}", self.config.url);

        self.teardown(&mut state, "manual reconnect");
        state.reconnect_enabled = self.config.reconnect;
        state.attempts = 0;
        state.last_error = None;
        self.schedule_connect(&mut state, Duration::from_millis(MANUAL_RECONNECT_DELAY));
    }

    /// Cancel timers, invalidate the current session and close its transport.
    fn teardown(&self, state: &mut ConnectionState, reason: &str) {
        state.clear_timers();
        let session_generation = state.generation;
        state.advance_generation();
        let outbound = state.outbound.take();

        match state.ready {
            ReadyState::Open => {
                self.apply(state, Transition::Disconnect);
                // The session writes the close frame and then exits by itself
                state.session.detach();

                let queued = outbound.is_some_and(|outbound| {
                    outbound
                        .send(Outbound::Close {
                            code: WS_CLOSE_NORMAL,
                            reason: reason.to_string(),
                        })
                        .is_ok()
                });
                if queued {
                    state.closing_session = Some(session_generation);
                } else {
                    self.apply(state, Transition::CloseCompleted);
                    self.emit(ConnectionEvent::Close {
                        code: WS_CLOSE_NORMAL,
                        reason: reason.to_string(),
                    });
                }
                tracing::info!("Disconnecting from {}", self.config.url);
            }
            ReadyState::Connecting => {
                state.session.cancel();
                self.apply(state, Transition::Disconnect);
                tracing::info!("Abandoned handshake with {}", self.config.url);
            }
            ReadyState::Closing | ReadyState::Closed => {}
        }
    }

    fn on_close_completed(&self, session_generation: u64, code: u16, reason: String) {
        let mut state = self.lock();
        if state.closing_session != Some(session_generation) {
            return;
        }

        state.closing_session = None;
        if self.apply(&mut state, Transition::CloseCompleted) {
            tracing::info!("Disconnected from {}", self.config.url);
            self.emit(ConnectionEvent::Close { code, reason });
        }
    }
}

impl HeartbeatTarget for Inner {
    fn beat(&self, generation: u64, payload: &str) -> Beat {
        let state = self.lock();
        if state.generation != generation {
            return Beat::Stale;
        }
        if state.ready != ReadyState::Open {
            return Beat::Skipped;
        }

        match &state.outbound {
            Some(outbound)
                if outbound
                    .send(Outbound::Frame(Message::text(payload)))
                    .is_ok() =>
            {
                Beat::Sent
            }
            _ => Beat::Skipped,
        }
    }
}

/// Owns the transport of one session: performs the handshake, then pumps
/// outbound commands and inbound frames until either side ends it.
async fn run_session(
    inner: Weak<Inner>,
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    generation: u64,
    request: HandshakeRequest,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    tracing::debug!("Starting session {} with {:?}", generation, request);

    let Transport {
        mut sink,
        mut stream,
    } = match connector.connect(request).await {
        Ok(transport) => transport,
        Err(err) => {
            if let Some(inner) = inner.upgrade() {
                inner.on_session_end(generation, SessionEnd::HandshakeFailed(err));
            }
            return;
        }
    };

    match inner.upgrade() {
        Some(inner) if inner.on_open(generation) => {}
        _ => {
            // Disconnected while the handshake was in flight
            let _ = sink.close().await;
            return;
        }
    }

    let end = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(err) = sink.send(frame).await {
                        break Some(SessionEnd::Failed(err.into()));
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: code.into(),
                        reason: reason.clone().into(),
                    };
                    let close = sink.send(Message::Close(Some(frame)));
                    match time::timeout(Duration::from_millis(CLOSE_FRAME_TIMEOUT), close).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => tracing::debug!("Failed to send close frame: {}", err),
                        Err(_) => tracing::debug!("Timed out sending close frame"),
                    }
                    match inner.upgrade() {
                        Some(inner) => inner.on_close_completed(generation, code, reason),
                        // Retargeted or dropped while closing; the receiver may still be listening
                        None => {
                            if events.send(ConnectionEvent::Close { code, reason }).is_err() {
                                tracing::debug!("Event receiver dropped, discarding close event");
                            }
                        }
                    }
                    break None;
                }
                // Manager dropped
                None => break None,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match inner.upgrade() {
                    Some(inner) => inner.deliver(generation, text.as_str()),
                    None => break None,
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                        None => {
                            tracing::warn!("Server closed connection without close frame");
                            (WS_CLOSE_NO_STATUS, String::new())
                        }
                    };
                    break Some(SessionEnd::Remote { code, reason });
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::warn!("Dropping unexpected binary frame ({} bytes)", data.len());
                }
                Some(Ok(Message::Ping(data))) => {
                    tracing::debug!("Received ping ({} bytes)", data.len());
                }
                Some(Ok(Message::Pong(data))) => {
                    tracing::debug!("Received pong ({} bytes)", data.len());
                }
                Some(Ok(Message::Frame(_))) => {
                    tracing::debug!("Received raw frame (internal)");
                }
                Some(Err(err)) => break Some(SessionEnd::Failed(err.into())),
                None => {
                    break Some(SessionEnd::Remote {
                        code: WS_CLOSE_ABNORMAL,
                        reason: "connection lost".to_string(),
                    });
                }
            }
        }
    };

    if let Some(end) = end
        && let Some(inner) = inner.upgrade()
    {
        inner.on_session_end(generation, end);
    }
    tracing::debug!("Session {} finished", generation);
}
