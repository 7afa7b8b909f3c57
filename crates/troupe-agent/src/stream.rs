use serde::{Deserialize, Serialize};
use troupe_core::TokenUsage;

/// Events emitted during a streaming model response.
///
/// A well-behaved responder emits any number of `TextDelta` events followed
/// by exactly one terminal event (`Completed` or `Error`). Consumers must
/// tolerate both terminal events being queued and act only on the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A chunk of text content.
    TextDelta {
        /// The incremental text.
        text: String,
    },

    /// The stream finished; carries the full text and token usage when the
    /// provider reported it.
    Completed {
        /// The complete response text.
        text: String,
        /// Token accounting, if available.
        usage: Option<TokenUsage>,
    },

    /// The stream ended in an error.
    Error {
        /// Provider-reported error message.
        message: String,
    },
}
