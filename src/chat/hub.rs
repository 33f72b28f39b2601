//! Per-chat broadcast hub.
//!
//! One producer (the generation task) publishes ordered events; any number
//! of subscribers read them independently. Each chat keeps a bounded,
//! sequence-stamped replay buffer so a subscriber attaching mid-generation
//! can be brought up to date and then tail live events without a gap or a
//! duplicate at the seam.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};

use super::events::StreamEvent;

/// Size of the broadcast channel for live delivery.
const EVENT_BUFFER_SIZE: usize = 256;

/// Number of events retained per chat for replay.
const REPLAY_BUFFER_SIZE: usize = 256;

/// A published event stamped with its per-chat sequence number.
pub type SeqEvent = (u64, StreamEvent);

/// Handle returned by [`BroadcastHub::subscribe`].
pub struct Subscription {
    /// Buffered events past the caller's marker, in publish order.
    pub replay: Vec<SeqEvent>,
    /// Live receiver, positioned exactly after the replay snapshot.
    pub receiver: broadcast::Receiver<SeqEvent>,
}

struct ChannelState {
    next_seq: u64,
    history: VecDeque<SeqEvent>,
}

struct ChatChannel {
    tx: broadcast::Sender<SeqEvent>,
    state: Mutex<ChannelState>,
}

/// Hub of per-chat broadcast channels.
pub struct BroadcastHub {
    channels: DashMap<String, Arc<ChatChannel>>,
}

impl BroadcastHub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    fn channel(&self, chat_id: &str) -> Arc<ChatChannel> {
        self.channels
            .entry(chat_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
                Arc::new(ChatChannel {
                    tx,
                    state: Mutex::new(ChannelState {
                        next_seq: 0,
                        history: VecDeque::new(),
                    }),
                })
            })
            .clone()
    }

    /// Publish an event on a chat's channel, preserving publish order.
    ///
    /// The send happens under the channel lock, so a concurrent subscriber
    /// observes the event either in its replay snapshot or on its live
    /// receiver, never both and never neither.
    pub async fn publish(&self, chat_id: &str, event: StreamEvent) {
        let channel = self.channel(chat_id);
        let mut state = channel.state.lock().await;

        let seq = state.next_seq;
        state.next_seq += 1;
        state.history.push_back((seq, event.clone()));
        if state.history.len() > REPLAY_BUFFER_SIZE {
            state.history.pop_front();
        }

        // No receivers is fine: the history buffer still records the event.
        let _ = channel.tx.send((seq, event));
    }

    /// Subscribe to a chat's events.
    ///
    /// With `after_message_id`, buffered events for messages at or before
    /// the marker are skipped; everything newer is replayed before the live
    /// receiver takes over.
    pub async fn subscribe(&self, chat_id: &str, after_message_id: Option<i64>) -> Subscription {
        let channel = self.channel(chat_id);
        let state = channel.state.lock().await;

        let replay: Vec<SeqEvent> = state
            .history
            .iter()
            .filter(|(_, event)| after_message_id.map_or(true, |m| event.message_id() > m))
            .cloned()
            .collect();
        let receiver = channel.tx.subscribe();

        Subscription { replay, receiver }
    }

    /// Drop a chat's channel and replay buffer.
    pub fn remove(&self, chat_id: &str) {
        self.channels.remove(chat_id);
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
