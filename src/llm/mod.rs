//! Model client abstraction.
//!
//! One `ChatClient` implementation exists per provider; the provider is
//! selected once from configuration at startup and never re-checked per
//! request.

mod mock;
mod ollama;
mod openai;

pub use mock::{MockChatClient, ScriptStep};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::MessageRole;

/// Lazy sequence of text deltas from a model reply.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// One role-tagged message of the prompt context.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Model client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model endpoint unreachable: {0}")]
    Connect(String),

    #[error("model endpoint returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed model response: {0}")]
    Protocol(String),

    #[error("model stream failed: {0}")]
    Stream(String),
}

/// A language-model client producing an incremental reply stream.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Start a completion over the full role-tagged history.
    async fn stream_chat(&self, messages: &[PromptMessage]) -> Result<DeltaStream, LlmError>;
}

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local Ollama server (`/api/chat`, NDJSON streaming).
    Ollama,
    /// OpenAI-compatible endpoint (`/chat/completions`, SSE streaming).
    Openai,
    /// Scripted in-process client for development and tests.
    Mock,
}

/// Model client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which provider implementation to use.
    pub provider: Provider,
    /// Base URL of the provider endpoint.
    pub base_url: String,
    /// Model name passed through to the provider.
    pub model: String,
    /// API key for providers that require one.
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
        }
    }
}

/// Build the configured client. Called once at startup.
pub fn build_client(config: &LlmConfig) -> Arc<dyn ChatClient> {
    match config.provider {
        Provider::Ollama => Arc::new(OllamaClient::new(&config.base_url, &config.model)),
        Provider::Openai => Arc::new(OpenAiClient::new(
            &config.base_url,
            &config.model,
            config.api_key.clone(),
        )),
        Provider::Mock => Arc::new(MockChatClient::new(["This is the scripted mock provider."])),
    }
}
