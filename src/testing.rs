//! In-process transports for exercising the connection lifecycle without a
//! network.

use crate::types::{Result, StreamError};
use crate::websocket::{Connector, HandshakeRequest, Transport};
use async_trait::async_trait;
use futures::channel::mpsc as frames;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

/// What the mock server does with the next handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
    /// Never completes the handshake
    Hang,
}

/// Connector that follows a script of handshake outcomes.
///
/// Once the script runs out every handshake is refused. Accepted connections
/// are handed to the test as [`ServerEnd`]s.
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<HandshakeRequest>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            servers,
        });
        (connector, accepted)
    }

    /// Append outcomes to the script
    pub fn script(&self, outcomes: &[Outcome]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn requests(&self) -> Vec<HandshakeRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of handshakes attempted so far
    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, request: HandshakeRequest) -> Result<Transport> {
        self.requests.lock().unwrap().push(request);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Refuse);

        match outcome {
            Outcome::Refuse => Err(StreamError::Handshake("connection refused".to_string())),
            Outcome::Hang => std::future::pending().await,
            Outcome::Accept => {
                let (inbound_tx, inbound_rx) = frames::unbounded();
                let (outbound_tx, outbound_rx) = frames::unbounded();

                let _ = self.servers.send(ServerEnd {
                    inbound: inbound_tx,
                    frames: outbound_rx,
                });

                Ok(Transport {
                    sink: Box::pin(outbound_tx.sink_map_err(|_| WsError::ConnectionClosed)),
                    stream: Box::pin(inbound_rx),
                })
            }
        }
    }
}

/// Server side of an accepted mock connection.
///
/// Dropping it ends the client's stream without a close frame.
pub(crate) struct ServerEnd {
    inbound: frames::UnboundedSender<std::result::Result<Message, WsError>>,
    frames: frames::UnboundedReceiver<Message>,
}

impl ServerEnd {
    pub fn send_text(&self, text: &str) {
        let _ = self.inbound.unbounded_send(Ok(Message::text(text)));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: code.into(),
            reason: reason.into(),
        };
        let _ = self.inbound.unbounded_send(Ok(Message::Close(Some(frame))));
    }

    /// Break the connection with a transport error
    pub fn fail(&self) {
        let err = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        let _ = self.inbound.unbounded_send(Err(WsError::Io(err)));
    }

    /// Next frame written by the client, or `None` once it dropped the sink
    pub async fn next_frame(&mut self) -> Option<Message> {
        time::timeout(Duration::from_secs(600), self.frames.next())
            .await
            .expect("timed out waiting for client frame")
    }
}

/// Counts warnings logged from modules under `target`.
///
/// Installed as the thread's default subscriber, so it only sees events from
/// a current-thread runtime.
#[derive(Clone)]
pub(crate) struct WarnCounter {
    target: &'static str,
    count: Arc<AtomicUsize>,
}

impl WarnCounter {
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Capture warnings until the guard is dropped
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() == Level::WARN && metadata.target().starts_with(self.target) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
