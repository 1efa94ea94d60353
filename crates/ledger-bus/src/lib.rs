//! # Ledger Bus - Insertion Event Notifications
//!
//! The insertion pipeline announces every account-block and snapshot-block
//! write twice: once *before* any store is touched and once *after* the
//! write is durably flushed. Downstream consumers (index builders, pools,
//! RPC layers) subscribe here instead of being called directly.
//!
//! ## Ordering contract
//!
//! For one insertion the bus observes, in program order:
//!
//! ```text
//! PrepareInsert* ──→ [store writes + durable flush] ──→ Insert*
//! ```
//!
//! Publishing is synchronous and never blocks the inserter; slow subscribers
//! lag on their own broadcast buffer.

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, LedgerEvent};
pub use publisher::LedgerEventBus;
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events buffered per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
