//! Chat data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageRole {
    /// A human prompt.
    User,
    /// A model reply.
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            _ => Err(format!("unknown message role: {}", s)),
        }
    }
}

/// A conversation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    /// Unique chat ID (UUIDv7, time-ordered).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

/// A persisted message within a chat.
///
/// `id` is strictly increasing in creation order within a chat and is the
/// marker clients hand back when reconnecting. An assistant reply gets its
/// row (and id) when generation starts; `finalized` stays false until the
/// stream terminates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: String,
    pub sender: MessageRole,
    pub text: String,
    pub finalized: bool,
    pub created_at: String,
}
