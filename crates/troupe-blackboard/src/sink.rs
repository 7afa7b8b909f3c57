use crate::board::BoardMessage;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

/// Durable audit sink that writes board messages to disk as JSONL.
///
/// Messages arrive over an unbounded channel and are written by a spawned
/// background task, so appends on the hot path stay non-blocking. Writer
/// errors are logged and swallowed; the audit trail is best-effort by
/// contract.
pub struct FileAuditSink {
    tx: mpsc::UnboundedSender<BoardMessage>,
}

impl FileAuditSink {
    /// Create the sink. Spawns the writer task appending to
    /// `<log_dir>/blackboard.jsonl`.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoardMessage>();

        tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
                warn!(error = %e, "audit sink could not create log dir");
                return;
            }
            let log_file = log_dir.join("blackboard.jsonl");

            while let Some(message) = rx.recv().await {
                let line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, seq = message.seq, "audit sink serialization failed");
                        continue;
                    }
                };
                let result = async {
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&log_file)
                        .await?;
                    file.write_all(format!("{line}\n").as_bytes()).await
                }
                .await;
                if let Err(e) = result {
                    warn!(error = %e, seq = message.seq, "audit sink write failed");
                }
            }
        });

        Self { tx }
    }

    /// A sender suitable for [`Blackboard::with_sink`].
    ///
    /// [`Blackboard::with_sink`]: crate::Blackboard::with_sink
    pub fn sender(&self) -> mpsc::UnboundedSender<BoardMessage> {
        self.tx.clone()
    }
}
