//! Headless, typed publish/subscribe bus broadcasting post-stage snapshots.
//!
//! Per §5's ordering guarantees, a [`SnapshotEvent`] is only ever published
//! *after* a stage has returned — observers never see a mid-stage state.
//! Built on [`tokio::sync::broadcast`], matching the event-routing idiom used
//! elsewhere in this workspace for fan-out to multiple WebSocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use cortex_types::BrainState;

const DEFAULT_CAPACITY: usize = 256;

/// A snapshot broadcast after a Kernel or ReAct stage completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub session_id: Uuid,
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub snapshot: BrainState,
}

impl SnapshotEvent {
    pub fn new(stage: impl Into<String>, snapshot: BrainState) -> Self {
        Self {
            session_id: snapshot.session_id,
            stage: stage.into(),
            timestamp: Utc::now(),
            snapshot,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SnapshotEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a post-stage snapshot to all active subscribers.
    ///
    /// Returns the number of receivers that received the event, or `0` if
    /// there are none; publishing with no subscribers is not an error — most
    /// sessions run with no observer attached.
    pub fn publish(&self, event: SnapshotEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.sender.subscribe()
    }

    /// Subscribe filtered to a single session id.
    pub fn subscribe_session(&self, session_id: Uuid) -> SessionSubscriber {
        SessionSubscriber { session_id, receiver: self.sender.subscribe() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A subscriber that only delivers events for one session.
pub struct SessionSubscriber {
    session_id: Uuid,
    receiver: broadcast::Receiver<SnapshotEvent>,
}

impl SessionSubscriber {
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.session_id == self.session_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "SessionSubscriber fell behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(session_id: Uuid, stage: &str) -> SnapshotEvent {
        SnapshotEvent::new(stage, BrainState::new(session_id))
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let session = Uuid::new_v4();

        let event = make_event(session, "K1");
        bus.publish(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.session_id, event.session_id);
        assert_eq!(received.stage, "K1");
    }

    #[tokio::test]
    async fn session_subscriber_filters_by_session() {
        let bus = EventBus::default();
        let session = Uuid::new_v4();
        let mut sub = bus.subscribe_session(session);

        bus.publish(make_event(Uuid::new_v4(), "K1"));
        let wanted = make_event(session, "K2");
        bus.publish(wanted.clone());

        let received = sub.recv().await.unwrap();
        assert_eq!(received.stage, "K2");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let session = Uuid::new_v4();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = make_event(session, "K6");
        bus.publish(event.clone());

        assert_eq!(rx1.recv().await.unwrap().stage, "K6");
        assert_eq!(rx2.recv().await.unwrap().stage, "K6");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(make_event(Uuid::new_v4(), "K1")), 0);
    }
}
