//! Streaming chat core.
//!
//! One generation session per chat at a time: the coordinator drives the
//! model stream and publishes events, the hub fans them out to any number
//! of viewers, the registry tracks what is in flight, and the subscriber
//! adapter implements catch-up plus live tail for viewers that attach
//! mid-generation.

mod cancel;
mod coordinator;
mod error;
mod events;
mod hub;
mod models;
mod registry;
mod repository;
mod subscriber;

pub use cancel::CancellationManager;
pub use coordinator::{ChatStreamingCoordinator, SubmitReceipt};
pub use error::{ChatError, ChatResult};
pub use events::{MessageEvent, StreamEvent};
pub use hub::{BroadcastHub, Subscription};
pub use models::{Chat, ChatMessage, MessageRole};
pub use registry::{ActiveSession, RegisterError, SessionRegistry};
pub use repository::ChatRepository;
pub use subscriber::SubscriberAdapter;
