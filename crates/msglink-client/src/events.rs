//! Domain events published to local observers.

use tokio::sync::broadcast;
use tracing::trace;

/// Something observers of the session may want to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A group recall is about to be sent to the server.
    GroupRecallInitiated {
        group_code: u64,
        author_id: u64,
        operator_id: u64,
        message_id: i64,
        time: i64,
    },
    /// The server confirmed a group recall.
    GroupRecallCompleted { group_code: u64, message_id: i64 },
    /// The server confirmed a direct-message recall.
    FriendRecallCompleted { friend_id: u64, message_id: i64 },
}

/// Fire-and-forget event publication.
pub trait EventSink: Send + Sync {
    /// Publishes an event. Never blocks and never waits for observers.
    fn publish(&self, event: SessionEvent);
}

/// An [`EventSink`] that fans events out over a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastEvents {
    /// Creates a sink buffering up to `capacity` events per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventSink for BroadcastEvents {
    fn publish(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("no event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let events = BroadcastEvents::default();
        let mut rx = events.subscribe();

        events.publish(SessionEvent::GroupRecallCompleted {
            group_code: 1,
            message_id: 2,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::GroupRecallCompleted {
                group_code: 1,
                message_id: 2
            }
        );
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let events = BroadcastEvents::new(4);
        events.publish(SessionEvent::FriendRecallCompleted {
            friend_id: 1,
            message_id: 2,
        });
    }
}
