use crate::errors::CallError;
use crate::signal::codec::SignalMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Transport seam for carrying signaling messages between room participants.
///
/// At-most-effort delivery: no ordering guarantee across independent senders,
/// no persistence, no redelivery. Any carrier honoring this contract (the
/// in-process [`LocalBus`], a WebSocket relay, a server-brokered room) is
/// interchangeable.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Publish a message to every other participant of the message's room.
    /// Fire-and-forget; delivery is not acknowledged.
    async fn publish(&self, message: SignalMessage) -> Result<(), CallError>;

    /// Subscribe to all messages addressed to a room. Fails with
    /// [`CallError::TransportUnavailable`] when the environment cannot
    /// provide a transport.
    async fn subscribe(&self, room_id: &str) -> Result<SignalSubscription, CallError>;
}

/// A live subscription to one room's signal traffic.
///
/// Dropping the subscription unsubscribes. Messages that arrive while the
/// subscriber is too far behind are skipped, not redelivered.
pub struct SignalSubscription {
    room_id: String,
    receiver: broadcast::Receiver<SignalMessage>,
}

impl SignalSubscription {
    pub(crate) fn new(room_id: String, receiver: broadcast::Receiver<SignalMessage>) -> Self {
        Self { room_id, receiver }
    }

    /// Room this subscription is scoped to
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Receive the next message, or `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<SignalMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "Signal subscription for room {} lagged, {} messages skipped",
                        self.room_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process signaling bus: the same-machine broadcast channel analogue.
///
/// Every subscriber of a room sees every message published to that room,
/// including its own (self-echo is suppressed at the receiver per the
/// membership rules, not here).
#[derive(Clone)]
pub struct LocalBus {
    name: String,
    capacity: usize,
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<SignalMessage>>>>,
}

impl LocalBus {
    /// Create a bus with the given name and per-room channel capacity
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bus name (diagnostic only)
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn room_sender(&self, room_id: &str) -> broadcast::Sender<SignalMessage> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new("peercall-signal", 64)
    }
}

#[async_trait]
impl SignalingTransport for LocalBus {
    async fn publish(&self, message: SignalMessage) -> Result<(), CallError> {
        let sender = self.room_sender(&message.room_id).await;
        log::debug!(
            "Publishing {} from {} to room {} on bus {}",
            message.kind,
            message.sender_id,
            message.room_id,
            self.name
        );
        // No subscribers yet is fine: fire-and-forget delivery.
        let _ = sender.send(message);
        Ok(())
    }

    async fn subscribe(&self, room_id: &str) -> Result<SignalSubscription, CallError> {
        let sender = self.room_sender(room_id).await;
        log::info!("Subscribed to room {} on bus {}", room_id, self.name);
        Ok(SignalSubscription::new(room_id.to_string(), sender.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::codec::SignalKind;

    fn message(room: &str, sender: &str) -> SignalMessage {
        SignalMessage {
            room_id: room.to_string(),
            sender_id: sender.to_string(),
            kind: SignalKind::Candidate,
            payload: serde_json::json!({"candidate": "c"}),
        }
    }

    #[tokio::test]
    async fn subscriber_sees_published_messages() {
        let bus = LocalBus::new("test-bus", 16);
        let mut sub = bus.subscribe("room-1").await.unwrap();

        bus.publish(message("room-1", "a")).await.unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received.sender_id, "a");
        assert_eq!(received.room_id, "room-1");
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let bus = LocalBus::new("test-bus", 16);
        let mut sub_a = bus.subscribe("room-a").await.unwrap();
        let mut sub_b = bus.subscribe("room-b").await.unwrap();

        bus.publish(message("room-a", "x")).await.unwrap();
        bus.publish(message("room-b", "y")).await.unwrap();

        assert_eq!(sub_a.recv().await.unwrap().sender_id, "x");
        assert_eq!(sub_b.recv().await.unwrap().sender_id, "y");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fire_and_forget() {
        let bus = LocalBus::new("test-bus", 16);
        assert!(bus.publish(message("empty-room", "a")).await.is_ok());
    }

    #[tokio::test]
    async fn per_sender_order_is_preserved() {
        let bus = LocalBus::new("test-bus", 64);
        let mut sub = bus.subscribe("room-1").await.unwrap();

        for i in 0..10 {
            let mut msg = message("room-1", "a");
            msg.payload = serde_json::json!({ "seq": i });
            bus.publish(msg).await.unwrap();
        }

        for i in 0..10 {
            let received = sub.recv().await.unwrap();
            assert_eq!(received.payload["seq"], i);
        }
    }
}
