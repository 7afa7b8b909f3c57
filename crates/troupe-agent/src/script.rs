use crate::responder::{ResponseHandle, StreamingResponder};
use crate::stream::StreamEvent;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use troupe_core::{TokenUsage, TroupeResult};

#[derive(Debug, Clone)]
enum Ending {
    Complete { usage: Option<TokenUsage> },
    Fail { message: String },
    Stall,
}

/// A deterministic in-process [`StreamingResponder`].
///
/// Streams a fixed reply as word-sized deltas and then completes, fails, or
/// stalls, depending on how it was built. Used by the CLI demo and by
/// integration tests in place of a real model backend.
#[derive(Clone)]
pub struct ScriptedResponder {
    reply: String,
    ending: Ending,
    prompts: Option<Arc<Mutex<Vec<String>>>>,
}

impl ScriptedResponder {
    /// Responder that streams `reply` and completes with usage accounting.
    pub fn replying(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        let usage = Some(TokenUsage {
            input_tokens: 32,
            output_tokens: reply.split_whitespace().count() as u64,
        });
        Self {
            reply,
            ending: Ending::Complete { usage },
            prompts: None,
        }
    }

    /// Responder that streams `reply` but completes without usage.
    pub fn without_usage(mut self) -> Self {
        self.ending = Ending::Complete { usage: None };
        self
    }

    /// Responder that streams any partial reply and then reports `message`
    /// as a terminal stream error.
    pub fn failing(partial: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reply: partial.into(),
            ending: Ending::Fail {
                message: message.into(),
            },
            prompts: None,
        }
    }

    /// Responder that streams `partial` and then never completes, forcing
    /// the collector's deadline path.
    pub fn stalling(partial: impl Into<String>) -> Self {
        Self {
            reply: partial.into(),
            ending: Ending::Stall,
            prompts: None,
        }
    }

    /// Record every prompt this responder receives into `log`.
    pub fn with_prompt_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.prompts = Some(log);
        self
    }
}

#[async_trait]
impl StreamingResponder for ScriptedResponder {
    async fn respond(&self, prompt: &str) -> TroupeResult<ResponseHandle> {
        if let Some(log) = &self.prompts {
            if let Ok(mut prompts) = log.lock() {
                prompts.push(prompt.to_string());
            }
        }

        let reply = self.reply.clone();
        let ending = self.ending.clone();
        let (tx, rx) = mpsc::channel(16);

        let producer = tokio::spawn(async move {
            let mut sent = String::new();
            for word in reply.split_inclusive(' ') {
                sent.push_str(word);
                if tx
                    .send(StreamEvent::TextDelta {
                        text: word.to_string(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            match ending {
                Ending::Complete { usage } => {
                    let _ = tx.send(StreamEvent::Completed { text: sent, usage }).await;
                }
                Ending::Fail { message } => {
                    let _ = tx.send(StreamEvent::Error { message }).await;
                }
                Ending::Stall => {
                    // Hold the channel open without ever completing.
                    let _tx = tx;
                    std::future::pending::<()>().await;
                }
            }
        });

        Ok(ResponseHandle::new(rx).with_producer(producer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Collected, ResponseCollector};

    #[tokio::test]
    async fn test_scripted_completes() {
        let responder = ScriptedResponder::replying("the quick brown fox");
        let mut handle = responder.respond("ignored").await.unwrap();
        let collected = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap();
        match collected {
            Collected::Complete { text, usage } => {
                assert_eq!(text, "the quick brown fox");
                assert_eq!(usage.unwrap().output_tokens, 4);
            }
            Collected::Partial { .. } => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let responder = ScriptedResponder::failing("some text", "backend exploded");
        let mut handle = responder.respond("ignored").await.unwrap();
        let err = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("backend exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_stall_degrades_to_partial() {
        let responder = ScriptedResponder::stalling("half an ");
        let mut handle = responder.respond("ignored").await.unwrap();
        let collected = ResponseCollector::default()
            .collect(&mut handle)
            .await
            .unwrap();
        assert_eq!(
            collected,
            Collected::Partial {
                text: "half an ".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_prompt_log() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let responder = ScriptedResponder::replying("ok").with_prompt_log(log.clone());
        let _ = responder.respond("first prompt").await.unwrap();
        let _ = responder.respond("second prompt").await.unwrap();
        let prompts = log.lock().unwrap();
        assert_eq!(prompts.as_slice(), ["first prompt", "second prompt"]);
    }
}
