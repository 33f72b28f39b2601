//! Ollama chat client.
//!
//! Streams replies from an Ollama server's `/api/chat` endpoint, which
//! answers with newline-delimited JSON chunks.

use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ChatClient, DeltaStream, LlmError, PromptMessage};

/// Client for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Create a new Ollama client.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<DeltaStream, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "stream": true,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
                .collect::<Vec<_>>(),
        });

        debug!("starting ollama completion against {}", url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let deltas = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::Stream(e.to_string())))
            .scan(String::new(), |buffer, chunk| {
                let items: Vec<Result<String, LlmError>> = match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_lines(buffer)
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(deltas.boxed())
    }
}

/// Split complete lines off the buffer and parse each into a delta.
fn drain_lines(buffer: &mut String) -> Vec<Result<String, LlmError>> {
    let mut items = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_chunk(line) {
            Ok(Some(text)) if !text.is_empty() => items.push(Ok(text)),
            Ok(_) => {}
            Err(e) => items.push(Err(e)),
        }
    }
    items
}

/// Extract the delta text from one NDJSON chunk.
fn parse_chunk(line: &str) -> Result<Option<String>, LlmError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| LlmError::Protocol(format!("invalid chunk: {e}")))?;

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(LlmError::Stream(error.to_string()));
    }

    Ok(value
        .pointer("/message/content")
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_chunk() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(parse_chunk(line).unwrap(), Some("Hi".to_string()));
    }

    #[test]
    fn test_parse_done_chunk_has_no_delta() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#;
        assert_eq!(parse_chunk(line).unwrap(), Some(String::new()));
    }

    #[test]
    fn test_parse_error_chunk() {
        let line = r#"{"error":"model not found"}"#;
        assert!(matches!(parse_chunk(line), Err(LlmError::Stream(_))));
    }

    #[test]
    fn test_parse_garbage_is_protocol_error() {
        assert!(matches!(parse_chunk("not json"), Err(LlmError::Protocol(_))));
    }

    #[test]
    fn test_drain_handles_split_lines() {
        let mut buffer = String::from(
            "{\"message\":{\"content\":\"a\"}}\n{\"message\":{\"content\":\"b\"}}\n{\"mess",
        );
        let items: Vec<String> = drain_lines(&mut buffer)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(items, vec!["a", "b"]);
        assert_eq!(buffer, "{\"mess");
    }
}
