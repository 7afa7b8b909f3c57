use crate::responder::ResponseHandle;
use crate::stream::StreamEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};
use troupe_core::{TokenUsage, TroupeError, TroupeResult};

/// Hard time budget for collecting one response.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Outcome of collecting a response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected {
    /// The stream completed; `text` is the full response.
    Complete {
        /// The complete response text.
        text: String,
        /// Token accounting, when the provider reported it.
        usage: Option<TokenUsage>,
    },
    /// The deadline elapsed first; `text` is everything accumulated so far.
    Partial {
        /// Best-effort partial text.
        text: String,
    },
}

impl Collected {
    /// The collected text, complete or partial.
    pub fn text(&self) -> &str {
        match self {
            Collected::Complete { text, .. } | Collected::Partial { text } => text,
        }
    }

    /// Consume into the collected text.
    pub fn into_text(self) -> String {
        match self {
            Collected::Complete { text, .. } | Collected::Partial { text } => text,
        }
    }

    /// Whether the deadline cut this response short.
    pub fn is_partial(&self) -> bool {
        matches!(self, Collected::Partial { .. })
    }
}

/// Converts a partial-token stream into one discrete result under a deadline.
///
/// Degrade-to-partial: a deadline expiry is not an error — the caller gets
/// the text accumulated so far. A terminal stream error before the deadline
/// propagates as [`TroupeError::TaskExecution`]. Resolution is exactly-once:
/// the first terminal outcome wins and nothing is consumed afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCollector {
    deadline: Duration,
}

impl Default for ResponseCollector {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl ResponseCollector {
    /// Collector with a custom deadline.
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// The configured deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Collect the stream into one result.
    pub async fn collect(&self, handle: &mut ResponseHandle) -> TroupeResult<Collected> {
        self.collect_inner(handle, None).await
    }

    /// Collect while forwarding each text delta to `deltas` as it arrives
    /// (the STREAMING execution strategy).
    pub async fn collect_forwarding(
        &self,
        handle: &mut ResponseHandle,
        deltas: &mpsc::UnboundedSender<String>,
    ) -> TroupeResult<Collected> {
        self.collect_inner(handle, Some(deltas)).await
    }

    /// Collect and require completion: a deadline expiry is
    /// [`TroupeError::CollectorTimeout`] instead of a partial result.
    pub async fn collect_complete(
        &self,
        handle: &mut ResponseHandle,
    ) -> TroupeResult<(String, Option<TokenUsage>)> {
        match self.collect_inner(handle, None).await? {
            Collected::Complete { text, usage } => Ok((text, usage)),
            Collected::Partial { .. } => Err(TroupeError::CollectorTimeout(self.deadline)),
        }
    }

    async fn collect_inner(
        &self,
        handle: &mut ResponseHandle,
        deltas: Option<&mpsc::UnboundedSender<String>>,
    ) -> TroupeResult<Collected> {
        let deadline = Instant::now() + self.deadline;
        let mut accumulated = String::new();

        loop {
            let event = match tokio::time::timeout_at(deadline, handle.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    warn!(
                        deadline = ?self.deadline,
                        partial_len = accumulated.len(),
                        "response did not complete within deadline, using partial text"
                    );
                    handle.cancel();
                    return Ok(Collected::Partial { text: accumulated });
                }
            };

            match event {
                Some(StreamEvent::TextDelta { text }) => {
                    if let Some(tx) = deltas {
                        let _ = tx.send(text.clone());
                    }
                    accumulated.push_str(&text);
                }
                Some(StreamEvent::Completed { text, usage }) => {
                    match &usage {
                        Some(u) => info!(
                            input_tokens = u.input_tokens,
                            output_tokens = u.output_tokens,
                            total_tokens = u.total(),
                            "response complete"
                        ),
                        None => warn!("response complete but no token usage reported"),
                    }
                    handle.cancel();
                    return Ok(Collected::Complete { text, usage });
                }
                Some(StreamEvent::Error { message }) => {
                    handle.cancel();
                    return Err(TroupeError::TaskExecution(message));
                }
                // Closing without a terminal event violates the responder
                // contract; the accumulated text cannot be trusted as a
                // result.
                None => {
                    return Err(TroupeError::TaskExecution(
                        "response stream closed before completion".to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_from(events: Vec<StreamEvent>) -> ResponseHandle {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event).unwrap();
        }
        // Sender dropped: stream closes after the queued events.
        ResponseHandle::new(rx)
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_within_deadline() {
        let mut handle = handle_from(vec![
            delta("hel"),
            delta("lo"),
            StreamEvent::Completed {
                text: "hello".to_string(),
                usage: Some(TokenUsage {
                    input_tokens: 3,
                    output_tokens: 2,
                }),
            },
        ]);

        let collected = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap();
        assert_eq!(
            collected,
            Collected::Complete {
                text: "hello".to_string(),
                usage: Some(TokenUsage {
                    input_tokens: 3,
                    output_tokens: 2,
                }),
            }
        );
        assert!(!collected.is_partial());
    }

    #[tokio::test]
    async fn test_completion_without_usage_is_ok() {
        let mut handle = handle_from(vec![StreamEvent::Completed {
            text: "done".to_string(),
            usage: None,
        }]);
        let collected = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap();
        assert_eq!(collected.text(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_partial() {
        let (tx, rx) = mpsc::channel(8);
        tx.try_send(delta("partial ")).unwrap();
        tx.try_send(delta("answer")).unwrap();
        // Keep the sender alive so the stream neither completes nor closes;
        // paused time auto-advances straight to the deadline.
        let producer = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        let mut handle = ResponseHandle::new(rx).with_producer(producer);

        let collected = ResponseCollector::new(Duration::from_secs(30))
            .collect(&mut handle)
            .await
            .unwrap();
        assert_eq!(
            collected,
            Collected::Partial {
                text: "partial answer".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let mut handle = handle_from(vec![
            delta("some text"),
            StreamEvent::Error {
                message: "rate limited".to_string(),
            },
        ]);
        let err = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_first_terminal_event_wins() {
        // Both a completion and an error are queued; only the first counts.
        let mut handle = handle_from(vec![
            StreamEvent::Completed {
                text: "ok".to_string(),
                usage: None,
            },
            StreamEvent::Error {
                message: "late failure".to_string(),
            },
        ]);
        let collected = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap();
        assert_eq!(collected.text(), "ok");
    }

    #[tokio::test]
    async fn test_closed_without_completion_is_error() {
        let mut handle = handle_from(vec![delta("half a")]);
        let err = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed before completion"));
    }

    #[tokio::test]
    async fn test_forwarding_deltas() {
        let mut handle = handle_from(vec![
            delta("a"),
            delta("b"),
            StreamEvent::Completed {
                text: "ab".to_string(),
                usage: None,
            },
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collected = ResponseCollector::default()
            .collect_forwarding(&mut handle, &tx)
            .await
            .unwrap();
        assert_eq!(collected.text(), "ab");
        assert_eq!(rx.recv().await.unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_complete_times_out_as_error() {
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        let mut handle = ResponseHandle::new(rx).with_producer(producer);

        let err = ResponseCollector::default()
            .collect_complete(&mut handle)
            .await
            .unwrap_err();
        assert!(matches!(err, TroupeError::CollectorTimeout(_)));
    }
}
