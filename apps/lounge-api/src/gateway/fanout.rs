//! Per-room broadcast channels on top of the shared pub/sub store.
//!
//! Every room has one channel, `chat:{room_id}`. Any process can publish to
//! it and every stream connection subscribed to it (in any process sharing
//! the broker) receives the event, in publish order.

use std::sync::Arc;

use crate::db::kv::{KeyValueStore, Subscription};
use crate::error::ApiError;

use super::events::RoomEvent;

/// Name of the broadcast channel of a room.
pub fn channel_name(room_id: &str) -> String {
    format!("chat:{room_id}")
}

/// Publishes and subscribes to room channels. Cheap to clone.
#[derive(Clone)]
pub struct RoomBroadcast {
    kv: Arc<dyn KeyValueStore>,
}

impl RoomBroadcast {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Publish an event to every current subscriber of the room.
    pub async fn publish(&self, room_id: &str, event: &RoomEvent) -> Result<(), ApiError> {
        let payload = serde_json::to_string(event)?;
        self.kv.publish(&channel_name(room_id), &payload).await
    }

    /// Subscribe to a room. Events published before this returns are never
    /// delivered to the new subscription.
    pub async fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, ApiError> {
        let inner = self.kv.subscribe(&channel_name(room_id)).await?;
        Ok(RoomSubscription { inner })
    }
}

/// A subscription to one room's channel. Dropping it unsubscribes.
pub struct RoomSubscription {
    inner: Subscription,
}

impl RoomSubscription {
    /// Next well-formed event. Malformed payloads are logged and skipped.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        loop {
            let payload = self.inner.recv().await?;
            match serde_json::from_str::<RoomEvent>(&payload) {
                Ok(event) => return Some(event),
                Err(e) => {
                    tracing::warn!(
                        channel = %self.inner.channel(),
                        error = %e,
                        "dropping malformed room event"
                    );
                }
            }
        }
    }

    pub fn unsubscribe(self) {
        self.inner.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryStore;

    #[tokio::test]
    async fn subscribers_receive_room_events_in_order() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let broadcast = RoomBroadcast::new(kv);
        let mut sub = broadcast.subscribe("room_1").await.unwrap();

        broadcast.publish("room_1", &RoomEvent::participants(1)).await.unwrap();
        broadcast.publish("room_2", &RoomEvent::participants(9)).await.unwrap();
        broadcast.publish("room_1", &RoomEvent::participants(2)).await.unwrap();

        assert_eq!(sub.recv().await, Some(RoomEvent::participants(1)));
        assert_eq!(sub.recv().await, Some(RoomEvent::participants(2)));
    }

    #[tokio::test]
    async fn malformed_payloads_are_skipped() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let broadcast = RoomBroadcast::new(kv.clone());
        let mut sub = broadcast.subscribe("room_1").await.unwrap();

        kv.publish("chat:room_1", "{not json").await.unwrap();
        kv.publish("chat:room_1", r#"{"event":"typing","data":{}}"#).await.unwrap();
        broadcast.publish("room_1", &RoomEvent::participants(4)).await.unwrap();

        assert_eq!(sub.recv().await, Some(RoomEvent::participants(4)));
    }

    #[test]
    fn channel_name_is_scoped_by_room() {
        assert_eq!(channel_name("room_abc"), "chat:room_abc");
    }
}
