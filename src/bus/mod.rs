//! Broadcast plane for push events.
//!
//! Uses tokio::sync::broadcast for pub/sub fan-out. Each subscriber owns a
//! bounded queue; slow subscribers lag and drop the oldest events instead of
//! back-pressuring the publisher or their peers.

mod events;

pub use events::{GroupEventEntry, PushEvent};

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Per-subscriber queue capacity; oldest events are dropped past this.
const BUS_CAPACITY: usize = 256;

/// Event bus handle for publishing and subscribing.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PushEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified per-subscriber capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers. Never blocks; send errors
    /// (no subscribers) are ignored.
    pub fn publish(&self, event: PushEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing.
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus with the default capacity.
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}

// =============================================================================
// Log forwarding layer
// =============================================================================

/// Tracing layer that mirrors WARN and ERROR records onto the broadcast
/// plane as `log` push frames, so connected admin clients see what the
/// server logs without tailing files.
pub struct BusLogLayer {
    bus: SharedBus,
}

impl BusLogLayer {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

impl<S: Subscriber> Layer<S> for BusLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.bus.publish(PushEvent::Log {
            level: meta.level().to_string(),
            message: visitor.message,
            target: meta.target().to_string(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pubsub() {
        let bus = create_bus();
        let mut rx = bus.subscribe();

        bus.publish(PushEvent::RoomFavChangedEvent {
            playerid: 7,
            count: 3,
        });

        let event = rx.recv().await.unwrap();
        match event {
            PushEvent::RoomFavChangedEvent { playerid, count } => {
                assert_eq!(playerid, 7);
                assert_eq!(count, 3);
            }
            other => panic!("wrong event type: {}", other.event_type()),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = create_bus();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PushEvent::AudioQueueEvent {
            playerid: 1,
            totalitems: 0,
            start: 0,
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            PushEvent::AudioQueueEvent { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            PushEvent::AudioQueueEvent { .. }
        ));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = Arc::new(EventBus::new(4));
        let mut rx = bus.subscribe();

        for i in 0..10 {
            bus.publish(PushEvent::AudioQueueEvent {
                playerid: i,
                totalitems: 0,
                start: 0,
            });
        }

        // The receiver lost the oldest events and reports how many.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n >= 6),
            other => panic!("expected lag, got {other:?}"),
        }
    }
}
