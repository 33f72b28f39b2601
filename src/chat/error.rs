//! Chat domain errors.

use thiserror::Error;

/// Errors surfaced by the chat core to its callers.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed request (blank name or text, bad id). No side effects.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown chat id.
    #[error("chat not found: {0}")]
    NotFound(String),

    /// A generation is already in flight for this chat; the existing
    /// session is unaffected.
    #[error("a generation is already active for chat {0}")]
    AlreadyActive(String),

    /// A store write failed on the submitting call path.
    #[error("persistence failure")]
    Persistence(#[source] anyhow::Error),
}

/// Result type for chat core operations.
pub type ChatResult<T> = Result<T, ChatError>;
