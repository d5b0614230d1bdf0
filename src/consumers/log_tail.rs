use super::ViewStatus;
use crate::connection::{ConnectionManager, EventReceiver};
use crate::infrastructure::TaskSlot;
use crate::types::{ConnectionEvent, MAX_LOG_LINES, StreamMessage};
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Bounded, ordered log lines. Appending past the capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line and return how many lines were evicted from the head.
    pub fn push(&mut self, line: impl Into<String>) -> usize {
        self.lines.push_back(line.into());

        let mut evicted = 0;
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(MAX_LOG_LINES)
    }
}

/// Window onto a [`LogBuffer`].
///
/// A pinned viewport follows the newest line. Scrolling up unpins it, and an
/// unpinned viewport keeps showing the same lines as new ones arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailViewport {
    height: usize,
    top: usize,
    pinned: bool,
}

impl TailViewport {
    pub fn new(height: usize) -> Self {
        Self {
            height: height.max(1),
            top: 0,
            pinned: true,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Index of the first visible line
    pub fn top(&self) -> usize {
        self.top
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    fn max_top(&self, len: usize) -> usize {
        len.saturating_sub(self.height)
    }

    /// Adjust after an append left `len` lines and evicted `evicted` from the head.
    pub fn after_append(&mut self, len: usize, evicted: usize) {
        if self.pinned {
            self.top = self.max_top(len);
        } else {
            self.top = self.top.saturating_sub(evicted);
        }
    }

    pub fn scroll_up(&mut self, lines: usize, len: usize) {
        self.top = self.top.saturating_sub(lines).min(self.max_top(len));
        self.pinned = self.top >= self.max_top(len);
    }

    pub fn scroll_down(&mut self, lines: usize, len: usize) {
        self.top = self.top.saturating_add(lines).min(self.max_top(len));
        self.pinned = self.top >= self.max_top(len);
    }

    pub fn scroll_to_bottom(&mut self, len: usize) {
        self.top = self.max_top(len);
        self.pinned = true;
    }

    pub fn resize(&mut self, height: usize, len: usize) {
        self.height = height.max(1);
        if self.pinned {
            self.top = self.max_top(len);
        } else {
            self.top = self.top.min(self.max_top(len));
        }
    }

    /// Line indices currently on screen
    pub fn visible(&self, len: usize) -> Range<usize> {
        let start = self.top.min(len);
        start..start.saturating_add(self.height).min(len)
    }
}

struct TailView {
    buffer: LogBuffer,
    viewport: TailViewport,
}

struct TailShared {
    view: Mutex<TailView>,
    revision: watch::Sender<u64>,
}

impl TailShared {
    fn lock(&self) -> MutexGuard<'_, TailView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, line: String) {
        {
            let mut view = self.lock();
            let evicted = view.buffer.push(line);
            let len = view.buffer.len();
            view.viewport.after_append(len, evicted);
        }
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

/// Live log tail for one node.
///
/// Owns its [`ConnectionManager`]; text frames become log lines in a
/// [`LogBuffer`] of [`MAX_LOG_LINES`]. Dropping the consumer disconnects the
/// stream and clears the buffer.
pub struct LogTailConsumer {
    manager: ConnectionManager,
    shared: Arc<TailShared>,
    pump: TaskSlot,
}

impl LogTailConsumer {
    /// Start tailing: connects `manager` and consumes `events`.
    ///
    /// The consuming task runs on the runtime `manager` was built on, so this
    /// may be called from any thread.
    pub fn new(manager: ConnectionManager, events: EventReceiver, height: usize) -> Self {
        Self::with_buffer(manager, events, LogBuffer::default(), height)
    }

    pub fn with_buffer(
        manager: ConnectionManager,
        events: EventReceiver,
        buffer: LogBuffer,
        height: usize,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        let shared = Arc::new(TailShared {
            view: Mutex::new(TailView {
                buffer,
                viewport: TailViewport::new(height),
            }),
            revision,
        });

        let mut pump = TaskSlot::new();
        pump.replace(manager.runtime().spawn(run_pump(Arc::clone(&shared), events)));

        manager.connect();
        Self {
            manager,
            shared,
            pump,
        }
    }

    pub fn status(&self) -> ViewStatus {
        self.manager.ready_state().into()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Retry after reconnection was exhausted or the stream looks stuck.
    pub fn reconnect(&self) {
        self.manager.manual_reconnect();
    }

    /// Revision counter that changes whenever the lines or the viewport change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lines(&self) -> Vec<String> {
        self.shared.lock().buffer.iter().map(str::to_owned).collect()
    }

    pub fn visible_lines(&self) -> Vec<String> {
        let view = self.shared.lock();
        let range = view.viewport.visible(view.buffer.len());
        view.buffer
            .iter()
            .skip(range.start)
            .take(range.len())
            .map(str::to_owned)
            .collect()
    }

    pub fn viewport(&self) -> TailViewport {
        self.shared.lock().viewport
    }

    pub fn scroll_up(&self, lines: usize) {
        self.update_viewport(|viewport, len| viewport.scroll_up(lines, len));
    }

    pub fn scroll_down(&self, lines: usize) {
        self.update_viewport(|viewport, len| viewport.scroll_down(lines, len));
    }

    pub fn scroll_to_bottom(&self) {
        self.update_viewport(|viewport, len| viewport.scroll_to_bottom(len));
    }

    pub fn resize(&self, height: usize) {
        self.update_viewport(|viewport, len| viewport.resize(height, len));
    }

    fn update_viewport(&self, update: impl FnOnce(&mut TailViewport, usize)) {
        {
            let mut view = self.shared.lock();
            let len = view.buffer.len();
            update(&mut view.viewport, len);
        }
        self.shared.bump();
    }
}

impl Drop for LogTailConsumer {
    fn drop(&mut self) {
        self.pump.cancel();
        self.manager.disconnect();
        self.shared.lock().buffer.clear();
        self.shared.bump();
    }
}

async fn run_pump(shared: Arc<TailShared>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Message(message) => shared.append(render_line(&message)),
            ConnectionEvent::Open => tracing::debug!("Log stream open"),
            ConnectionEvent::Close { code, reason } => {
                tracing::debug!("Log stream closed: code={}, reason='{}'", code, reason)
            }
            ConnectionEvent::Error(err) => tracing::debug!("Log stream error: {}", err),
            ConnectionEvent::ReconnectExhausted { attempts } => {
                tracing::warn!("Log stream gave up after {} attempts", attempts)
            }
        }
    }
}

/// One display line per frame
fn render_line(message: &StreamMessage) -> String {
    match message {
        StreamMessage::Text(text) => {
            let line = text.strip_suffix('\n').unwrap_or(text);
            line.strip_suffix('\r').unwrap_or(line).to_string()
        }
        StreamMessage::Structured(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::testing::{MockConnector, Outcome};
    use std::time::Duration;
    use tokio::time;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_buffer_keeps_most_recent_lines_in_order() {
        let mut buffer = LogBuffer::default();
        let mut evicted = 0;
        for i in 0..250 {
            evicted += buffer.push(format!("line {}", i));
        }

        assert_eq!(buffer.len(), 200);
        assert_eq!(evicted, 50);
        let lines: Vec<&str> = buffer.iter().collect();
        assert_eq!(lines[0], "line 50");
        assert_eq!(lines[199], "line 249");
    }

    #[test]
    fn test_pinned_viewport_follows_tail() {
        let mut buffer = LogBuffer::new(10);
        let mut viewport = TailViewport::new(4);
        for i in 0..12 {
            let evicted = buffer.push(i.to_string());
            viewport.after_append(buffer.len(), evicted);
        }

        assert!(viewport.is_pinned());
        assert_eq!(viewport.visible(buffer.len()), 6..10);
    }

    #[test]
    fn test_scrolled_viewport_is_not_yanked_to_bottom() {
        let mut buffer = LogBuffer::new(10);
        let mut viewport = TailViewport::new(4);
        for i in 0..8 {
            let evicted = buffer.push(i.to_string());
            viewport.after_append(buffer.len(), evicted);
        }

        viewport.scroll_up(3, buffer.len());
        assert!(!viewport.is_pinned());
        assert_eq!(viewport.top(), 1);

        // Head evictions move the window up until it reaches the oldest line
        for i in 8..12 {
            let evicted = buffer.push(i.to_string());
            viewport.after_append(buffer.len(), evicted);
        }
        let lines: Vec<&str> = buffer.iter().collect();
        assert_eq!(lines[viewport.top()], "2");
        assert!(!viewport.is_pinned());

        viewport.scroll_down(100, buffer.len());
        assert!(viewport.is_pinned());
        assert_eq!(viewport.visible(buffer.len()), 6..10);
    }

    #[test]
    fn test_short_buffer_stays_pinned() {
        let mut viewport = TailViewport::new(20);
        viewport.scroll_up(5, 3);
        assert!(viewport.is_pinned());
        assert_eq!(viewport.visible(3), 0..3);
    }

    #[test]
    fn test_render_line() {
        assert_eq!(
            render_line(&StreamMessage::Text("started sshd\r\n".into())),
            "started sshd"
        );
        assert_eq!(render_line(&StreamMessage::Text("a\n\n".into())), "a\n");
        let value = serde_json::json!({"level": "warn", "msg": "disk"});
        assert_eq!(
            render_line(&StreamMessage::Structured(value)),
            r#"{"level":"warn","msg":"disk"}"#
        );
    }

    async fn wait_for_len(consumer: &LogTailConsumer, len: usize) {
        let mut revision = consumer.subscribe();
        time::timeout(Duration::from_secs(600), async {
            while consumer.len() < len {
                revision.changed().await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for log lines");
    }

    fn tail(connector: &Arc<MockConnector>, height: usize) -> LogTailConsumer {
        let config = ConnectionConfig::new("ws://node-1.test/ws/logs").with_heartbeat_interval(0);
        let (manager, events) = ConnectionManager::builder(config)
            .connector(connector.clone())
            .build()
            .unwrap();
        LogTailConsumer::new(manager, events, height)
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_tails_lines_and_reports_status() {
        let (connector, mut servers) = MockConnector::new();
        connector.script(&[Outcome::Accept]);
        let consumer = tail(&connector, 2);
        assert_eq!(consumer.status(), ViewStatus::Connecting);

        let server = servers.recv().await.unwrap();
        for line in ["boot\n", "eth0 up\n", "sshd ready\n"] {
            server.send_text(line);
        }
        wait_for_len(&consumer, 3).await;

        assert_eq!(consumer.status(), ViewStatus::Connected);
        assert_eq!(consumer.lines(), vec!["boot", "eth0 up", "sshd ready"]);
        assert_eq!(consumer.visible_lines(), vec!["eth0 up", "sshd ready"]);

        consumer.scroll_up(1);
        server.send_text("cron tick");
        wait_for_len(&consumer, 4).await;
        assert_eq!(consumer.visible_lines(), vec!["boot", "eth0 up"]);

        consumer.scroll_to_bottom();
        assert_eq!(consumer.visible_lines(), vec!["sshd ready", "cron tick"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_disconnects_and_clears_buffer() {
        let (connector, mut servers) = MockConnector::new();
        connector.script(&[Outcome::Accept]);
        let consumer = tail(&connector, 10);

        let mut server = servers.recv().await.unwrap();
        server.send_text("one");
        wait_for_len(&consumer, 1).await;

        let shared = Arc::clone(&consumer.shared);
        drop(consumer);

        assert!(shared.lock().buffer.is_empty());
        assert!(matches!(server.next_frame().await, Some(Message::Close(_))));
    }

    #[test]
    fn test_consumer_starts_outside_runtime_context() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (connector, mut servers) = MockConnector::new();
        connector.script(&[Outcome::Accept]);
        let (manager, events) = runtime.block_on(async {
            let config =
                ConnectionConfig::new("ws://node-1.test/ws/logs").with_heartbeat_interval(0);
            ConnectionManager::builder(config)
                .connector(connector.clone())
                .build()
                .unwrap()
        });

        // No runtime is entered on this thread
        let consumer = LogTailConsumer::new(manager, events, 5);
        assert_eq!(consumer.status(), ViewStatus::Connecting);

        let server = runtime.block_on(servers.recv()).unwrap();
        server.send_text("boot");
        runtime.block_on(wait_for_len(&consumer, 1));
        assert_eq!(consumer.lines(), vec!["boot"]);
        drop(consumer);
    }
}
