use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Local side effects the UI layer binds sounds and toasts to.
/// Delivery is lossy: slow subscribers drop the oldest events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageSent {
        channel_id: String,
    },
    MessageReceived {
        channel_id: String,
        sender_id: String,
        timestamp: DateTime<Utc>,
    },
    ConversationWiped {
        channel_id: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(component = "events", "no subscribers for event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_events_to_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(ChatEvent::MessageSent {
            channel_id: "u1_u2".to_string(),
        });

        match rx.recv().await.expect("event") {
            ChatEvent::MessageSent { channel_id } => assert_eq!(channel_id, "u1_u2"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emitting_without_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        bus.emit(ChatEvent::ConversationWiped {
            channel_id: "u1_u2".to_string(),
        });
    }
}
