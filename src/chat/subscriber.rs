//! Subscriber adapter: bridges a network viewer to persisted history and
//! the live broadcast channel.
//!
//! Attaching implements the catch-up/then-live-tail protocol: persisted
//! messages past the caller's marker first, then buffered and live events
//! for the in-flight generation, terminating once a terminal event is
//! delivered. Detaching (dropping the stream) never affects the
//! generation.

use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use log::warn;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::error::{ChatError, ChatResult};
use super::events::MessageEvent;
use super::hub::BroadcastHub;
use super::registry::SessionRegistry;
use super::repository::ChatRepository;

/// Adapter producing per-viewer event streams.
pub struct SubscriberAdapter {
    repo: ChatRepository,
    hub: Arc<BroadcastHub>,
    registry: Arc<SessionRegistry>,
}

impl SubscriberAdapter {
    /// Create a new adapter.
    pub fn new(
        repo: ChatRepository,
        hub: Arc<BroadcastHub>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            repo,
            hub,
            registry,
        }
    }

    /// Attach a viewer to a chat.
    ///
    /// Yields persisted messages with an id past `last_seen` (each as a
    /// full-text item), then live events until a terminal event arrives.
    /// When no generation is active, the stream ends after the persisted
    /// tail.
    pub async fn attach(
        &self,
        chat_id: &str,
        last_seen: Option<i64>,
    ) -> ChatResult<BoxStream<'static, MessageEvent>> {
        self.repo
            .get_chat(chat_id)
            .await
            .map_err(ChatError::Persistence)?
            .ok_or_else(|| ChatError::NotFound(chat_id.to_string()))?;

        // Active-check before the store read: a session that ends in
        // between has already persisted its reply, so the read picks it up.
        let was_active = self.registry.is_active(chat_id);

        let persisted = self
            .repo
            .messages_after(chat_id, last_seen)
            .await
            .map_err(ChatError::Persistence)?;
        let marker = persisted.last().map(|m| m.id).or(last_seen);
        let catchup: Vec<MessageEvent> =
            persisted.iter().map(MessageEvent::from_persisted).collect();

        if !was_active && !self.registry.is_active(chat_id) {
            return Ok(stream::iter(catchup).boxed());
        }

        let subscription = self.hub.subscribe(chat_id, marker).await;
        let replay: Vec<MessageEvent> = subscription
            .replay
            .into_iter()
            .map(|(_, event)| MessageEvent::from(event))
            .collect();

        // The session may have ended between the registry check and the
        // hub subscription; its terminal event is then either in the
        // persisted tail (filtered by the marker) or in the replay buffer.
        let replay_has_final = replay.iter().any(|e| e.is_final);
        if !self.registry.is_active(chat_id) && !replay_has_final {
            return Ok(stream::iter(catchup.into_iter().chain(replay)).boxed());
        }

        let live = BroadcastStream::new(subscription.receiver).filter_map(move |item| {
            futures::future::ready(match item {
                Ok((_, event)) => {
                    if marker.is_some_and(|m| event.message_id() <= m) {
                        None
                    } else {
                        Some(MessageEvent::from(event))
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("chat subscriber lagged, skipped {} events", skipped);
                    None
                }
            })
        });

        // Catch-up items are full persisted messages and never terminate
        // the stream; only a terminal event from the replay/live tail does.
        let tail = stream::iter(replay).chain(live).scan(false, |done, event| {
            if *done {
                return futures::future::ready(None);
            }
            *done = event.is_final;
            futures::future::ready(Some(event))
        });

        Ok(stream::iter(catchup).chain(tail).boxed())
    }
}
