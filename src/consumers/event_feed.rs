use super::ViewStatus;
use crate::connection::{ConnectionManager, EventReceiver};
use crate::infrastructure::TaskSlot;
use crate::types::{
    AGGREGATE_FEED_CAP, ConnectionEvent, EVENT_HISTORY_WINDOW, EVENT_POLL_INTERVAL, NODE_FEED_CAP,
    Result, StreamError, StreamMessage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// One alert record, as pushed live and as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Node the event originated from
    pub source: String,
    /// Per-source sequence number
    pub seq: u64,
    /// Unix milliseconds
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl AlertEvent {
    /// De-duplication key shared by the live and polled paths
    pub fn key(&self) -> String {
        format!("{}-{}", self.source, self.seq)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Historical event source polled by [`EventFeedConsumer`].
#[async_trait]
pub trait EventHistory: Send + Sync {
    /// Events that started at or after `since_ms`, optionally limited to one node.
    async fn fetch_since(&self, since_ms: i64, node: Option<&str>) -> Result<Vec<AlertEvent>>;
}

/// Which events a feed shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedScope {
    /// Every node, for the fleet overview
    #[default]
    Aggregate,
    /// A single node's detail view
    Node(String),
}

impl FeedScope {
    pub fn cap(&self) -> usize {
        match self {
            FeedScope::Aggregate => AGGREGATE_FEED_CAP,
            FeedScope::Node(_) => NODE_FEED_CAP,
        }
    }

    pub fn node(&self) -> Option<&str> {
        match self {
            FeedScope::Aggregate => None,
            FeedScope::Node(node) => Some(node.as_str()),
        }
    }

    fn admits(&self, event: &AlertEvent) -> bool {
        self.node().is_none_or(|node| event.source == node)
    }
}

/// Event feed parameters. Intervals are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub scope: FeedScope,
    pub poll_interval_ms: u64,
    /// How far back each history poll reaches
    pub history_window_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            scope: FeedScope::Aggregate,
            poll_interval_ms: EVENT_POLL_INTERVAL,
            history_window_ms: EVENT_HISTORY_WINDOW,
        }
    }
}

impl FeedConfig {
    pub fn new(scope: FeedScope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(StreamError::Config(
                "event poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cap(&self) -> usize {
        self.scope.cap()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Merge live and polled events into one view.
///
/// Live events come first so they win key collisions; the result is sorted by
/// start time, newest first, and truncated to `cap`. Applying it to its own
/// output is a no-op.
pub fn merge(live: &[AlertEvent], polled: &[AlertEvent], cap: usize) -> Vec<AlertEvent> {
    let mut seen = HashSet::new();
    let mut merged: Vec<AlertEvent> = live
        .iter()
        .chain(polled)
        .filter(|event| seen.insert(event.key()))
        .cloned()
        .collect();

    merged.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    merged.truncate(cap);
    merged
}

/// Live and polled events plus their merged view.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    live: Vec<AlertEvent>,
    polled: Vec<AlertEvent>,
    merged: Vec<AlertEvent>,
    cap: usize,
}

impl EventBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            live: Vec::new(),
            polled: Vec::new(),
            merged: Vec::new(),
            cap,
        }
    }

    /// Record a live event. A newer live event for the same key replaces the
    /// older one.
    pub fn push_live(&mut self, event: AlertEvent) {
        let key = event.key();
        self.live.retain(|existing| existing.key() != key);
        self.live.push(event);
        self.live.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        self.live.truncate(self.cap);
        self.remerge();
    }

    /// Replace the polled set with the result of a successful poll.
    pub fn replace_polled(&mut self, events: Vec<AlertEvent>) {
        self.polled = events;
        self.remerge();
    }

    /// The merged view
    pub fn events(&self) -> &[AlertEvent] {
        &self.merged
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.polled.clear();
        self.merged.clear();
    }

    fn remerge(&mut self) {
        self.merged = merge(&self.live, &self.polled, self.cap);
    }
}

struct FeedShared {
    buffer: Mutex<EventBuffer>,
    updates: watch::Sender<Vec<AlertEvent>>,
}

impl FeedShared {
    fn update(&self, apply: impl FnOnce(&mut EventBuffer)) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut *buffer);
        self.updates.send_replace(buffer.events().to_vec());
    }

    fn lock(&self) -> MutexGuard<'_, EventBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Alert feed combining a live event stream with periodic history polls.
///
/// Either source alone keeps the feed populated: while the stream is down the
/// poll backfills, and a failed poll leaves the last good result in place.
pub struct EventFeedConsumer {
    manager: ConnectionManager,
    config: FeedConfig,
    shared: Arc<FeedShared>,
    pump: TaskSlot,
    poller: TaskSlot,
}

impl EventFeedConsumer {
    /// Connect `manager`, consume its `events` and start polling `history`.
    ///
    /// The first poll runs immediately. Both tasks run on the runtime `manager`
    /// was built on.
    pub fn new(
        manager: ConnectionManager,
        events: EventReceiver,
        history: Arc<dyn EventHistory>,
        config: FeedConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (updates, _) = watch::channel(Vec::new());
        let shared = Arc::new(FeedShared {
            buffer: Mutex::new(EventBuffer::new(config.cap())),
            updates,
        });

        let mut pump = TaskSlot::new();
        pump.replace(manager.runtime().spawn(run_pump(
            Arc::clone(&shared),
            events,
            config.scope.clone(),
        )));
        let mut poller = TaskSlot::new();
        poller.replace(manager.runtime().spawn(run_poller(
            Arc::clone(&shared),
            history,
            config.clone(),
        )));

        manager.connect();
        Ok(Self {
            manager,
            config,
            shared,
            pump,
            poller,
        })
    }

    /// Current merged view, newest first
    pub fn events(&self) -> Vec<AlertEvent> {
        self.shared.lock().events().to_vec()
    }

    /// Receive every new merged view.
    pub fn subscribe(&self) -> watch::Receiver<Vec<AlertEvent>> {
        self.shared.updates.subscribe()
    }

    pub fn status(&self) -> ViewStatus {
        self.manager.ready_state().into()
    }

    pub fn scope(&self) -> &FeedScope {
        &self.config.scope
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn reconnect(&self) {
        self.manager.manual_reconnect();
    }
}

impl Drop for EventFeedConsumer {
    fn drop(&mut self) {
        self.pump.cancel();
        self.poller.cancel();
        self.manager.disconnect();
        self.shared.lock().clear();
    }
}

async fn run_pump(shared: Arc<FeedShared>, mut events: EventReceiver, scope: FeedScope) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Message(message) => match decode_event(message) {
                Ok(event) if scope.admits(&event) => shared.update(|buffer| buffer.push_live(event)),
                Ok(event) => tracing::debug!("Ignoring event {} outside feed scope", event.key()),
                Err(err) => tracing::warn!("Dropping malformed live event: {}", err),
            },
            ConnectionEvent::Open => tracing::debug!("Event stream open"),
            ConnectionEvent::Close { code, .. } => {
                tracing::debug!("Event stream closed with code {}", code)
            }
            ConnectionEvent::Error(err) => tracing::debug!("Event stream error: {}", err),
            ConnectionEvent::ReconnectExhausted { attempts } => {
                tracing::warn!(
                    "Event stream gave up after {} attempts, relying on polling",
                    attempts
                )
            }
        }
    }
}

async fn run_poller(shared: Arc<FeedShared>, history: Arc<dyn EventHistory>, config: FeedConfig) {
    let window = i64::try_from(config.history_window_ms).unwrap_or(i64::MAX);
    let mut ticker = time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let since = now_ms().saturating_sub(window);
        match history.fetch_since(since, config.scope.node()).await {
            Ok(events) => {
                tracing::debug!("Polled {} historical events", events.len());
                let events = events
                    .into_iter()
                    .filter(|event| config.scope.admits(event))
                    .collect();
                shared.update(|buffer| buffer.replace_polled(events));
            }
            Err(err) => {
                tracing::warn!("Event history poll failed, keeping last known events: {}", err)
            }
        }
    }
}

fn decode_event(message: StreamMessage) -> Result<AlertEvent> {
    let decoded = match message {
        StreamMessage::Structured(value) => serde_json::from_value(value),
        StreamMessage::Text(text) => serde_json::from_str(&text),
    };
    decoded.map_err(StreamError::Decode)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
