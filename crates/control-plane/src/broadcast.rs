// Realtime broadcast hub
//
// Named channels backed by tokio broadcast senders. Publishing to a channel
// nobody listens on is fine; a subscriber that falls more than `capacity`
// messages behind loses the oldest ones.

use std::collections::HashMap;

use lendwise_core::{BroadcastMessage, CHANNELS};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

/// Messages buffered per channel for slow subscribers
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub struct BroadcastHub {
    channels: RwLock<HashMap<String, broadcast::Sender<BroadcastMessage>>>,
    capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Whether `channel` is one a dashboard may subscribe to
    pub fn is_known_channel(channel: &str) -> bool {
        CHANNELS.contains(&channel)
    }

    /// Subscribe to a channel, creating it on first use
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<BroadcastMessage> {
        if let Some(sender) = self.channels.read().get(channel) {
            return sender.subscribe();
        }
        self.channels
            .write()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish to the message's channel. Returns how many subscribers received it.
    pub fn publish(&self, message: BroadcastMessage) -> usize {
        let channels = self.channels.read();
        let Some(sender) = channels.get(&message.channel) else {
            trace!(channel = %message.channel, "No subscribers, message dropped");
            return 0;
        };
        // Err only means every receiver has gone away
        sender.send(message).unwrap_or(0)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}
