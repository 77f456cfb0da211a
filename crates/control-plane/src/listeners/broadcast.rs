// Broadcast subscriber: pushes each status event to the realtime channels

use async_trait::async_trait;
use lendwise_core::{BroadcastMessage, EventListener, StatusChangeEvent};
use std::sync::Arc;
use tracing::debug;

use crate::broadcast::BroadcastHub;

pub struct BroadcastListener {
    hub: Arc<BroadcastHub>,
}

impl BroadcastListener {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventListener for BroadcastListener {
    async fn on_event(&self, event: &StatusChangeEvent) {
        for channel in event.channels() {
            let delivered = self.hub.publish(BroadcastMessage::for_channel(channel, event));
            debug!(
                channel,
                event_type = %event.event_type,
                entity_id = %event.entity_id,
                delivered,
                "Broadcast status change"
            );
        }
    }

    fn name(&self) -> &'static str {
        "broadcast"
    }
}
