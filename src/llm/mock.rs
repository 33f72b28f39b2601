//! Scripted model client for development and tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{ChatClient, DeltaStream, LlmError, PromptMessage};

/// One step of a scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit a text delta.
    Delta(String),
    /// Fail the stream with the given message.
    Fail(String),
    /// Suspend forever; the stream only ends when the consumer drops it
    /// (e.g. on cancellation).
    Hold,
}

/// A `ChatClient` that replays a fixed script instead of calling a model.
pub struct MockChatClient {
    steps: Vec<ScriptStep>,
    delay: Duration,
    requests: Arc<Mutex<Vec<Vec<PromptMessage>>>>,
}

impl MockChatClient {
    /// Script that emits the given deltas and completes.
    pub fn new<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = deltas
            .into_iter()
            .map(|d| ScriptStep::Delta(d.into()))
            .collect();
        Self::with_steps(steps)
    }

    /// Script with explicit steps.
    pub fn with_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep this long before each delta.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The prompt histories this client has been called with.
    pub fn requests(&self) -> Vec<Vec<PromptMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<DeltaStream, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let delay = self.delay;
        let steps = self.steps.clone().into_iter();

        let stream = futures::stream::unfold(steps, move |mut steps| async move {
            match steps.next() {
                Some(ScriptStep::Delta(text)) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some((Ok(text), steps))
                }
                Some(ScriptStep::Fail(message)) => {
                    Some((Err(LlmError::Stream(message)), steps))
                }
                Some(ScriptStep::Hold) => futures::future::pending().await,
                None => None,
            }
        });

        Ok(stream.boxed())
    }
}
