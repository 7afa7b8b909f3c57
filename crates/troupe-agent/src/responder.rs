use crate::stream::StreamEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use troupe_core::TroupeResult;

/// The capability every worker exposes: given a prompt, open a streaming
/// response.
///
/// Implementations wrap whatever actually produces tokens (a provider API,
/// a local process, a script). The orchestration core only ever consumes
/// this trait.
#[async_trait]
pub trait StreamingResponder: Send + Sync {
    /// Start a response for the given prompt.
    async fn respond(&self, prompt: &str) -> TroupeResult<ResponseHandle>;
}

/// An in-flight streaming response: an event receiver plus the producer task
/// that feeds it.
///
/// Dropping or [`cancel`](ResponseHandle::cancel)ling the handle aborts the
/// producer, so cancellation always propagates to the underlying stream.
pub struct ResponseHandle {
    events: mpsc::Receiver<StreamEvent>,
    producer: Option<JoinHandle<()>>,
}

impl ResponseHandle {
    /// Wrap a plain event receiver.
    pub fn new(events: mpsc::Receiver<StreamEvent>) -> Self {
        Self {
            events,
            producer: None,
        }
    }

    /// Attach the producer task so cancellation can abort it.
    pub fn with_producer(mut self, producer: JoinHandle<()>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Receive the next event; `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Cancel the response: abort the producer and close the channel.
    ///
    /// Safe to call more than once; events already received are unaffected.
    pub fn cancel(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.events.close();
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}
