//! # Ledger Events
//!
//! One enum variant per insertion notification. Payloads are shared
//! (`Arc`-wrapped) so publishing to many subscribers never clones block
//! data.

use ledger_types::{AccountBlock, SnapshotBlock, VmAccountBlock};
use std::sync::Arc;

/// All events that flow through the ledger bus.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// Account blocks are about to be written to the stores.
    PrepareInsertAccountBlocks(Arc<[VmAccountBlock]>),

    /// Account blocks were written and are durably visible.
    InsertAccountBlocks(Arc<[VmAccountBlock]>),

    /// Snapshot blocks are about to be written to the stores.
    PrepareInsertSnapshotBlocks(Arc<[SnapshotBlock]>),

    /// Snapshot blocks were written and are durably visible. Carries the
    /// unconfirmed account blocks the insertion invalidated and deleted.
    InsertSnapshotBlocks {
        blocks: Arc<[SnapshotBlock]>,
        invalidated: Arc<[AccountBlock]>,
    },
}

impl LedgerEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::PrepareInsertAccountBlocks(_) | Self::InsertAccountBlocks(_) => {
                EventTopic::AccountBlocks
            }
            Self::PrepareInsertSnapshotBlocks(_) | Self::InsertSnapshotBlocks { .. } => {
                EventTopic::SnapshotBlocks
            }
        }
    }

    /// Whether this is a prepare (pre-write) notification.
    #[must_use]
    pub fn is_prepare(&self) -> bool {
        matches!(
            self,
            Self::PrepareInsertAccountBlocks(_) | Self::PrepareInsertSnapshotBlocks(_)
        )
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// Account-block insertion events.
    AccountBlocks,
    /// Snapshot-block insertion events.
    SnapshotBlocks,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// A filter that accepts every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
