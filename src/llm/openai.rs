//! OpenAI-compatible chat client.
//!
//! Streams replies from a `/chat/completions` endpoint over SSE. Works
//! against OpenAI itself and compatible gateways.

use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde_json::{json, Value};
use std::time::Duration;

use super::{ChatClient, DeltaStream, LlmError, PromptMessage};

/// Client for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    /// Create a new client. `base_url` includes the API root, e.g.
    /// `https://api.openai.com/v1`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<DeltaStream, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "stream": true,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
                .collect::<Vec<_>>(),
        });

        debug!("starting openai completion against {}", url);

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let source = EventSource::new(request).map_err(|e| LlmError::Connect(e.to_string()))?;

        let deltas = source
            .scan(false, |done, event| {
                let step: Option<Option<Result<String, LlmError>>> = if *done {
                    None
                } else {
                    match event {
                        Ok(Event::Open) => Some(None),
                        Ok(Event::Message(message)) => {
                            if message.data.trim() == "[DONE]" {
                                *done = true;
                                None
                            } else {
                                match parse_chunk(&message.data) {
                                    Ok(delta) => Some(delta.map(Ok)),
                                    Err(e) => {
                                        *done = true;
                                        Some(Some(Err(e)))
                                    }
                                }
                            }
                        }
                        Err(reqwest_eventsource::Error::StreamEnded) => None,
                        Err(e) => {
                            *done = true;
                            Some(Some(Err(LlmError::Stream(e.to_string()))))
                        }
                    }
                };
                futures::future::ready(step)
            })
            .filter_map(futures::future::ready);

        Ok(deltas.boxed())
    }
}

/// Extract the delta text from one SSE data payload.
fn parse_chunk(data: &str) -> Result<Option<String>, LlmError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| LlmError::Protocol(format!("invalid chunk: {e}")))?;

    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}
