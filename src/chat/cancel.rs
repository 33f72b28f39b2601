//! Cancellation of in-flight generations by chat id.

use std::sync::Arc;

use log::debug;
use tokio_util::sync::CancellationToken;

use super::registry::SessionRegistry;

/// External-facing cancellation capability.
///
/// Cancellation is best-effort: if a generation completes a moment before
/// the request arrives, the persisted message is the completed one and no
/// error is surfaced.
pub struct CancellationManager {
    registry: Arc<SessionRegistry>,
}

impl CancellationManager {
    /// Create a new manager over the given registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The cancellation signal for a chat's active session.
    ///
    /// When no session is active the returned token is already cancelled,
    /// so callers observing it terminate immediately instead of erroring.
    pub fn signal(&self, chat_id: &str) -> CancellationToken {
        match self.registry.lookup(chat_id) {
            Some(session) => session.cancel,
            None => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    /// Request cancellation of a chat's active session.
    ///
    /// Returns promptly without waiting for the generation to stop. Safe
    /// to call repeatedly, concurrently, or after natural completion.
    pub fn cancel(&self, chat_id: &str) {
        match self.registry.lookup(chat_id) {
            Some(session) => {
                debug!("cancelling generation for chat {}", chat_id);
                session.cancel.cancel();
            }
            None => debug!("cancel for chat {} ignored, no active session", chat_id),
        }
    }
}
