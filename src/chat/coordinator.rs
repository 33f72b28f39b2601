//! Streaming coordinator: one end-to-end generation per submitted prompt.
//!
//! `submit` registers the session (concurrent prompts for the same chat are
//! rejected), persists the user message, allocates the assistant reply row,
//! and spawns the generation task. The task consumes the model's delta
//! stream, publishes every fragment on the chat's broadcast channel, reacts
//! to cancellation between deltas, persists the final text, and always
//! terminates with exactly one `Final` event before unregistering.

use std::sync::Arc;

use log::{debug, error, warn};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::error::{ChatError, ChatResult};
use super::events::StreamEvent;
use super::hub::BroadcastHub;
use super::models::MessageRole;
use super::registry::SessionRegistry;
use super::repository::ChatRepository;
use crate::llm::{ChatClient, PromptMessage};

/// Ids allocated for one submitted prompt.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub chat_id: String,
    pub user_message_id: i64,
    pub assistant_message_id: i64,
}

/// Orchestrates generations across all chats.
pub struct ChatStreamingCoordinator {
    repo: ChatRepository,
    hub: Arc<BroadcastHub>,
    registry: Arc<SessionRegistry>,
    client: Arc<dyn ChatClient>,
}

impl ChatStreamingCoordinator {
    /// Create a new coordinator.
    pub fn new(
        repo: ChatRepository,
        hub: Arc<BroadcastHub>,
        registry: Arc<SessionRegistry>,
        client: Arc<dyn ChatClient>,
    ) -> Self {
        Self {
            repo,
            hub,
            registry,
            client,
        }
    }

    /// Start a generation for a prompt.
    ///
    /// The registry entry is taken before anything is persisted: it is the
    /// atomic gate that keeps at most one session per chat. The user
    /// message is durably appended before the generation task starts, so a
    /// catch-up read never observes generation state without its prompt.
    pub async fn submit(&self, chat_id: &str, prompt: &str) -> ChatResult<SubmitReceipt> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::InvalidArgument(
                "message text must not be blank".to_string(),
            ));
        }

        self.repo
            .get_chat(chat_id)
            .await
            .map_err(ChatError::Persistence)?
            .ok_or_else(|| ChatError::NotFound(chat_id.to_string()))?;

        let cancel = self
            .registry
            .register(chat_id)
            .map_err(|_| ChatError::AlreadyActive(chat_id.to_string()))?;

        let started = self.start_session(chat_id, prompt, cancel).await;
        if started.is_err() {
            self.registry.unregister(chat_id);
        }
        started
    }

    async fn start_session(
        &self,
        chat_id: &str,
        prompt: &str,
        cancel: CancellationToken,
    ) -> ChatResult<SubmitReceipt> {
        let user_message = self
            .repo
            .append_user_message(chat_id, prompt)
            .await
            .map_err(ChatError::Persistence)?;

        let assistant_message_id = self
            .repo
            .begin_assistant_message(chat_id)
            .await
            .map_err(ChatError::Persistence)?;
        self.registry.set_message_id(chat_id, assistant_message_id);

        let history = self
            .repo
            .list_messages(chat_id)
            .await
            .map_err(ChatError::Persistence)?;
        let context: Vec<PromptMessage> = history
            .iter()
            .map(|m| PromptMessage {
                role: m.sender,
                content: m.text.clone(),
            })
            .collect();

        debug!(
            "starting generation for chat {} (reply message {})",
            chat_id, assistant_message_id
        );

        let repo = self.repo.clone();
        let hub = Arc::clone(&self.hub);
        let registry = Arc::clone(&self.registry);
        let client = Arc::clone(&self.client);
        let chat_id_owned = chat_id.to_string();
        tokio::spawn(async move {
            run_generation(
                repo,
                hub,
                registry,
                client,
                chat_id_owned,
                assistant_message_id,
                context,
                cancel,
            )
            .await;
        });

        Ok(SubmitReceipt {
            chat_id: chat_id.to_string(),
            user_message_id: user_message.id,
            assistant_message_id,
        })
    }
}

/// Drive one generation to its terminal state.
///
/// All exit paths converge on the finalize block below: persist the
/// accumulated text, publish the single `Final` event, unregister.
#[allow(clippy::too_many_arguments)]
async fn run_generation(
    repo: ChatRepository,
    hub: Arc<BroadcastHub>,
    registry: Arc<SessionRegistry>,
    client: Arc<dyn ChatClient>,
    chat_id: String,
    message_id: i64,
    context: Vec<PromptMessage>,
    cancel: CancellationToken,
) {
    let mut text = String::new();
    let mut error: Option<String> = None;

    match client.stream_chat(&context).await {
        Ok(mut deltas) => loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("generation for chat {} cancelled, keeping partial reply", chat_id);
                    break;
                }
                next = deltas.next() => match next {
                    Some(Ok(delta)) => {
                        if delta.is_empty() {
                            continue;
                        }
                        text.push_str(&delta);
                        hub.publish(&chat_id, StreamEvent::Delta {
                            message_id,
                            sender: MessageRole::Assistant,
                            text: delta,
                        })
                        .await;
                    }
                    Some(Err(e)) => {
                        warn!("model stream for chat {} failed: {}", chat_id, e);
                        error = Some(e.to_string());
                        break;
                    }
                    None => break,
                }
            }
        },
        Err(e) => {
            warn!("model client for chat {} failed to start: {}", chat_id, e);
            error = Some(e.to_string());
        }
    }

    // Persist before publishing the terminal event so a subscriber that
    // attaches after seeing `Final` finds the message in the store.
    if let Err(e) = repo.finalize_message(message_id, &text).await {
        error!(
            "failed to persist reply {} for chat {}: {:?}",
            message_id, chat_id, e
        );
    }

    hub.publish(
        &chat_id,
        StreamEvent::Final {
            message_id,
            sender: MessageRole::Assistant,
            text,
            error,
        },
    )
    .await;

    registry.unregister(&chat_id);
}
