//! Application state shared across handlers.

use std::sync::Arc;

use crate::chat::{
    BroadcastHub, CancellationManager, ChatRepository, ChatStreamingCoordinator, SessionRegistry,
    SubscriberAdapter,
};
use crate::db::Database;
use crate::llm::ChatClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Chat and message persistence.
    pub repo: ChatRepository,
    /// Per-chat broadcast channels.
    pub hub: Arc<BroadcastHub>,
    /// In-flight generation sessions.
    pub registry: Arc<SessionRegistry>,
    /// Generation orchestration.
    pub coordinator: Arc<ChatStreamingCoordinator>,
    /// Viewer attachment.
    pub subscribers: Arc<SubscriberAdapter>,
    /// Cancellation of in-flight generations.
    pub cancellations: Arc<CancellationManager>,
}

impl AppState {
    /// Wire up application state over a database and a model client.
    pub fn new(db: &Database, client: Arc<dyn ChatClient>) -> Self {
        let repo = ChatRepository::new(db.pool().clone());
        let hub = Arc::new(BroadcastHub::new());
        let registry = Arc::new(SessionRegistry::new());

        let coordinator = Arc::new(ChatStreamingCoordinator::new(
            repo.clone(),
            Arc::clone(&hub),
            Arc::clone(&registry),
            client,
        ));
        let subscribers = Arc::new(SubscriberAdapter::new(
            repo.clone(),
            Arc::clone(&hub),
            Arc::clone(&registry),
        ));
        let cancellations = Arc::new(CancellationManager::new(Arc::clone(&registry)));

        Self {
            repo,
            hub,
            registry,
            coordinator,
            subscribers,
            cancellations,
        }
    }
}
