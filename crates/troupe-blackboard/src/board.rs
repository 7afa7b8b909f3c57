use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;
use troupe_core::AgentRole;
use uuid::Uuid;

/// One immutable record in the blackboard's message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMessage {
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    /// The run this message belongs to.
    pub run_id: Uuid,
    /// The task that produced it; supervisor-level messages have none.
    pub task_id: Option<String>,
    /// Role of the producer.
    pub role: AgentRole,
    /// Free-form category, e.g. "plan", "result", "error", "discarded".
    pub kind: String,
    /// Message body.
    pub content: String,
    /// Arbitrary key/value metadata.
    pub meta: HashMap<String, String>,
    /// UTC time of the append.
    pub timestamp: DateTime<Utc>,
}

struct MessageLog {
    next_seq: u64,
    messages: Vec<BoardMessage>,
}

/// Run-scoped concurrent key/value store plus append-only message log.
///
/// Keys are opaque to the store. Entry operations go through a sharded map,
/// so concurrent tasks touching different keys do not contend; the message
/// log takes its own short lock only for the append itself. No operation
/// returns a domain error — an absent key is simply `None`.
pub struct Blackboard {
    run_id: Uuid,
    entries: DashMap<String, String>,
    log: Mutex<MessageLog>,
    sink: Option<mpsc::UnboundedSender<BoardMessage>>,
}

impl Blackboard {
    /// Create the board for one run.
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            entries: DashMap::new(),
            log: Mutex::new(MessageLog {
                next_seq: 0,
                messages: Vec::new(),
            }),
            sink: None,
        }
    }

    /// Forward every appended message to a durable sink.
    ///
    /// Forwarding is fire-and-forget; a slow or dead sink never blocks task
    /// execution.
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<BoardMessage>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The run this board belongs to.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Store a value. A later `get` from any task sees the full value or a
    /// previous one, never a torn write.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Fetch a value; `None` when the key was never written.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Immutable copy of the entries reflecting all writes ordered before
    /// the call.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of stored entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Append to the message log; returns the assigned sequence number.
    ///
    /// Appends are atomic: the sequence number is assigned and the record
    /// stored under one lock, so concurrent callers always observe strictly
    /// increasing numbers in log order.
    pub fn append_message(
        &self,
        task_id: Option<&str>,
        role: AgentRole,
        kind: impl Into<String>,
        content: impl Into<String>,
        meta: HashMap<String, String>,
    ) -> u64 {
        let message = {
            let mut log = self.log.lock();
            log.next_seq += 1;
            let message = BoardMessage {
                seq: log.next_seq,
                run_id: self.run_id,
                task_id: task_id.map(str::to_string),
                role,
                kind: kind.into(),
                content: content.into(),
                meta,
                timestamp: Utc::now(),
            };
            log.messages.push(message.clone());
            message
        };

        debug!(
            run_id = %message.run_id,
            seq = message.seq,
            role = %message.role,
            kind = %message.kind,
            "blackboard message"
        );

        if let Some(sink) = &self.sink {
            let _ = sink.send(message.clone());
        }
        message.seq
    }

    /// Copy of the message log in append order.
    pub fn messages(&self) -> Vec<BoardMessage> {
        self.log.lock().messages.clone()
    }

    /// Number of appended messages.
    pub fn message_count(&self) -> usize {
        self.log.lock().messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn board() -> Blackboard {
        Blackboard::new(Uuid::new_v4())
    }

    #[test]
    fn test_put_get_absent() {
        let board = board();
        assert_eq!(board.get("missing"), None);
        board.put("k", "v");
        assert_eq!(board.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_put_overwrites() {
        let board = board();
        board.put("k", "first");
        board.put("k", "second");
        assert_eq!(board.get("k"), Some("second".to_string()));
    }

    #[test]
    fn test_snapshot_contains_all_writes() {
        let board = board();
        for i in 0..32 {
            board.put(format!("key-{i}"), format!("value-{i}"));
        }
        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 32);
        assert_eq!(snapshot.get("key-7"), Some(&"value-7".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_different_keys() {
        let board = Arc::new(board());
        let mut handles = Vec::new();
        for i in 0..16 {
            let board = board.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    board.put(format!("task-{i}-key-{j}"), format!("{i}:{j}"));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(board.entry_count(), 16 * 50);
        assert_eq!(board.get("task-3-key-49"), Some("3:49".to_string()));
    }

    #[test]
    fn test_append_returns_increasing_seq() {
        let board = board();
        let a = board.append_message(None, AgentRole::Supervisor, "plan", "p", HashMap::new());
        let b = board.append_message(
            Some("T1"),
            AgentRole::Researcher,
            "result",
            "r",
            HashMap::new(),
        );
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        let messages = board.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].task_id, None);
        assert_eq!(messages[1].task_id.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_unique_seqs() {
        let board = Arc::new(board());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let board = board.clone();
            handles.push(tokio::spawn(async move {
                let mut seqs = Vec::new();
                for _ in 0..25 {
                    seqs.push(board.append_message(
                        Some("T1"),
                        AgentRole::Worker,
                        "note",
                        "n",
                        HashMap::new(),
                    ));
                }
                seqs
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 200);

        // Log order matches sequence order.
        let messages = board.messages();
        for window in messages.windows(2) {
            assert!(window[0].seq < window[1].seq);
        }
    }

    #[test]
    fn test_sink_receives_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let board = Blackboard::new(Uuid::new_v4()).with_sink(tx);
        board.append_message(None, AgentRole::Supervisor, "plan", "hello", HashMap::new());
        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.seq, 1);
        assert_eq!(forwarded.content, "hello");
    }

    #[test]
    fn test_dead_sink_does_not_block() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let board = Blackboard::new(Uuid::new_v4()).with_sink(tx);
        let seq = board.append_message(None, AgentRole::Supervisor, "plan", "p", HashMap::new());
        assert_eq!(seq, 1);
        assert_eq!(board.message_count(), 1);
    }
}
