//! Stream event types for live chat delivery.
//!
//! `StreamEvent` is the internal broadcast payload; `MessageEvent` is the
//! wire shape pushed to clients. All events carry the message id so
//! reconnecting clients can resume from the last id they saw.

use serde::Serialize;

use super::models::{ChatMessage, MessageRole};

/// Events published on a chat's broadcast channel during generation.
///
/// Within one chat, events are totally ordered as published. Exactly one
/// `Final` is published per generation session, on every termination path.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// One incremental text fragment.
    Delta {
        message_id: i64,
        sender: MessageRole,
        text: String,
    },

    /// Terminal event for a generation: complete text on success, the
    /// accumulated partial text on cancellation, and an error marker when
    /// the model stream failed.
    Final {
        message_id: i64,
        sender: MessageRole,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StreamEvent {
    /// The message this event belongs to.
    pub fn message_id(&self) -> i64 {
        match self {
            StreamEvent::Delta { message_id, .. } => *message_id,
            StreamEvent::Final { message_id, .. } => *message_id,
        }
    }

    /// Whether this is a terminal event.
    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::Final { .. })
    }
}

/// Wire shape for server-push delivery: `{id, sender, text, isFinal}`.
///
/// Catch-up items (replayed persisted messages) and terminal events both
/// arrive with `isFinal: true` and the full message text; deltas carry
/// just the fragment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub id: i64,
    pub sender: MessageRole,
    pub text: String,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageEvent {
    /// Catch-up item for a persisted message.
    pub fn from_persisted(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            text: message.text.clone(),
            is_final: true,
            error: None,
        }
    }
}

impl From<StreamEvent> for MessageEvent {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Delta {
                message_id,
                sender,
                text,
            } => Self {
                id: message_id,
                sender,
                text,
                is_final: false,
                error: None,
            },
            StreamEvent::Final {
                message_id,
                sender,
                text,
                error,
            } => Self {
                id: message_id,
                sender,
                text,
                is_final: true,
                error,
            },
        }
    }
}
