//! # Event Subscriber
//!
//! Receiving side of the bus: a filtered view over a broadcast receiver.

use crate::events::{EventFilter, LedgerEvent};
use tokio::sync::broadcast;

/// Errors surfaced to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped; no further events will arrive.
    Closed,
    /// The subscriber fell behind and `skipped` events were discarded.
    Lagged { skipped: u64 },
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "event bus closed"),
            Self::Lagged { skipped } => write!(f, "subscriber lagged, {skipped} events skipped"),
        }
    }
}

impl std::error::Error for SubscriptionError {}

/// A filtered subscription handle.
pub struct Subscription {
    receiver: broadcast::Receiver<LedgerEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<LedgerEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event matching this subscription's filter.
    ///
    /// Non-matching events are consumed and skipped silently.
    pub async fn recv(&mut self) -> Result<LedgerEvent, SubscriptionError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(SubscriptionError::Lagged { skipped })
                }
            }
        }
    }

    /// Drain any already-buffered matching event without waiting.
    pub fn try_recv(&mut self) -> Option<LedgerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::LedgerEventBus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_recv_in_publish_order() {
        let bus = LedgerEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        bus.publish(LedgerEvent::PrepareInsertAccountBlocks(Arc::from(
            Vec::new(),
        )));
        bus.publish(LedgerEvent::InsertAccountBlocks(Arc::from(Vec::new())));

        assert!(sub.recv().await.unwrap().is_prepare());
        assert!(!sub.recv().await.unwrap().is_prepare());
    }

    #[tokio::test]
    async fn test_closed_after_bus_drop() {
        let bus = LedgerEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);

        assert!(matches!(sub.recv().await, Err(SubscriptionError::Closed)));
    }

    #[test]
    fn test_try_recv_filters() {
        let bus = LedgerEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::SnapshotBlocks]));

        bus.publish(LedgerEvent::InsertAccountBlocks(Arc::from(Vec::new())));
        assert!(sub.try_recv().is_none());

        bus.publish(LedgerEvent::PrepareInsertSnapshotBlocks(Arc::from(
            Vec::new(),
        )));
        assert!(sub.try_recv().is_some());
    }
}
