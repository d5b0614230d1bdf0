use tokio::task::JoinHandle;

/// Holds at most one background task (a pending timer or a session).
///
/// Replacing or cancelling aborts the previous task; dropping the slot aborts
/// whatever it still holds.
#[derive(Debug, Default)]
pub struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Track `handle`, aborting any task previously held
    pub fn replace(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.handle.replace(handle) {
            previous.abort();
        }
    }

    /// Abort the held task. Returns whether a task was still pending.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Stop tracking the held task without aborting it
    pub fn detach(&mut self) {
        self.handle = None;
    }

    /// Whether the slot holds a task that has not finished yet
    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
