use parking_lot::Mutex;
use std::collections::VecDeque;

/// Queue of user messages that arrive while a run's tasks are executing.
///
/// The session pushes; the engine drains at SERIAL step / HYBRID group
/// boundaries and applies the plan's message-handling policy. In-flight
/// tasks are never interrupted by a push.
#[derive(Default)]
pub struct MessageInbox {
    queue: Mutex<VecDeque<String>>,
}

impl MessageInbox {
    /// Empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a user message.
    pub fn push(&self, message: impl Into<String>) {
        self.queue.lock().push_back(message.into());
    }

    /// Take every queued message, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the inbox is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
