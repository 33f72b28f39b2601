//! Registry of in-flight generation sessions.
//!
//! Tracks, per chat, whether a generation is running and its cancellation
//! handle. The registry never owns session cleanup; the coordinator's
//! generation task unregisters itself on every termination path.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A registered generation session.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    /// Id of the in-progress assistant reply, once allocated.
    pub message_id: Option<i64>,
    /// Cancellation handle observed by the generation loop.
    pub cancel: CancellationToken,
}

/// Errors from session registration.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("a generation is already active for chat {0}")]
    AlreadyActive(String),
}

/// Concurrent map of chat id to active session.
///
/// Registration is the single atomic check-and-set guarding the
/// one-session-per-chat invariant; the map entry API makes concurrent
/// registrations on the same chat id linearizable.
pub struct SessionRegistry {
    sessions: DashMap<String, ActiveSession>,
}

impl SessionRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a session for a chat, returning its fresh cancellation
    /// token. Fails if a session is already active for the chat.
    pub fn register(&self, chat_id: &str) -> Result<CancellationToken, RegisterError> {
        match self.sessions.entry(chat_id.to_string()) {
            Entry::Occupied(_) => Err(RegisterError::AlreadyActive(chat_id.to_string())),
            Entry::Vacant(entry) => {
                let cancel = CancellationToken::new();
                entry.insert(ActiveSession {
                    message_id: None,
                    cancel: cancel.clone(),
                });
                Ok(cancel)
            }
        }
    }

    /// Record the assistant message id once the placeholder row exists.
    pub fn set_message_id(&self, chat_id: &str, message_id: i64) {
        if let Some(mut session) = self.sessions.get_mut(chat_id) {
            session.message_id = Some(message_id);
        }
    }

    /// Look up the active session for a chat.
    pub fn lookup(&self, chat_id: &str) -> Option<ActiveSession> {
        self.sessions.get(chat_id).map(|s| s.value().clone())
    }

    /// Whether a generation is currently active for a chat.
    pub fn is_active(&self, chat_id: &str) -> bool {
        self.sessions.contains_key(chat_id)
    }

    /// Remove a chat's session. Idempotent; removing an absent entry is a
    /// no-op.
    pub fn unregister(&self, chat_id: &str) {
        self.sessions.remove(chat_id);
    }

    /// Chat ids with a session currently in flight.
    pub fn active_chats(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
