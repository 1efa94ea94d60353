//! # Event Publisher
//!
//! In-memory bus built on `tokio::sync::broadcast`. Publishing is a plain
//! synchronous call so the insertion pipeline can fire notifications from
//! non-async code; subscribers drain their receivers asynchronously.

use crate::events::{EventFilter, LedgerEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// In-memory implementation of the ledger event bus.
///
/// Multi-producer, multi-consumer; suitable for single-process operation.
pub struct LedgerEventBus {
    /// Broadcast sender for events.
    sender: broadcast::Sender<LedgerEvent>,

    /// Total events published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl LedgerEventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the specified per-subscriber capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Publish an event to every live subscriber.
    ///
    /// Returns the number of subscribers that received the event. Never
    /// blocks; with no subscribers the event is dropped.
    pub fn publish(&self, event: LedgerEvent) -> usize {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(topic = ?topic, receivers = receiver_count, "Event published");
                receiver_count
            }
            Err(_) => {
                trace!(topic = ?topic, "Event dropped (no receivers)");
                0
            }
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "New subscription created");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total number of events published so far.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Per-subscriber channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LedgerEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use std::sync::Arc;

    fn account_event() -> LedgerEvent {
        LedgerEvent::InsertAccountBlocks(Arc::from(Vec::new()))
    }

    #[test]
    fn test_publish_no_subscribers() {
        let bus = LedgerEventBus::new();

        let receivers = bus.publish(account_event());
        assert_eq!(receivers, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_publish_with_subscriber() {
        let bus = LedgerEventBus::new();

        // Create subscriber BEFORE publishing
        let mut sub = bus.subscribe(EventFilter::all());

        let receivers = bus.publish(account_event());
        assert_eq!(receivers, 1);
        assert_eq!(bus.subscriber_count(), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received.topic(), EventTopic::AccountBlocks);
    }

    #[tokio::test]
    async fn test_filtered_subscriber_skips_other_topics() {
        let bus = LedgerEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::SnapshotBlocks]));

        bus.publish(account_event());
        bus.publish(LedgerEvent::PrepareInsertSnapshotBlocks(Arc::from(
            Vec::new(),
        )));

        // The account event is filtered out; the first received event is the
        // snapshot one.
        let received = sub.recv().await.unwrap();
        assert_eq!(received.topic(), EventTopic::SnapshotBlocks);
    }

    #[test]
    fn test_multiple_subscribers() {
        let bus = LedgerEventBus::new();

        let _sub1 = bus.subscribe(EventFilter::all());
        let _sub2 = bus.subscribe(EventFilter::all());
        let _sub3 = bus.subscribe(EventFilter::topics(vec![EventTopic::AccountBlocks]));

        let receivers = bus.publish(account_event());
        assert_eq!(receivers, 3);
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[test]
    fn test_custom_capacity() {
        let bus = LedgerEventBus::with_capacity(100);
        assert_eq!(bus.capacity(), 100);
    }
}
