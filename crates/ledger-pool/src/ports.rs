//! # Outbound Ports
//!
//! What the snapshot pool requires from its collaborators: the canonical
//! disk chain, the account sub-pool, a fetcher for missing blocks, and the
//! block pool's after-insert hook.

use crate::error::PoolError;
use ledger_types::{Address, HashHeight, SnapshotBlock};

/// The canonical persisted snapshot chain the pool inserts into and rolls
/// back.
pub trait DiskChain: Send + Sync {
    /// Current head of the disk chain.
    fn head(&self) -> HashHeight;

    /// The block at `height`, if the disk chain has one.
    fn block_at(&self, height: u64) -> Result<Option<HashHeight>, PoolError>;

    /// Write one verified snapshot block through the insertion pipeline.
    fn insert_snapshot_block(&self, block: &SnapshotBlock) -> Result<(), PoolError>;

    /// Roll back so `height` becomes the head; returns the removed
    /// snapshots (ascending) and the affected account addresses.
    fn rollback_to(&self, height: u64)
        -> Result<(Vec<SnapshotBlock>, Vec<Address>), PoolError>;
}

/// The account sub-pool the snapshot pool steers on verification failures.
pub trait AccountPoolOps: Send + Sync {
    /// Fork one account chain to the pinned `(hash, height)`.
    fn fork_account_to(&self, address: &Address, target: &HashHeight) -> Result<(), PoolError>;

    /// Ask the account pool to reach `target` (fetching missing blocks).
    /// A non-null result means the account must also be forked.
    fn pending_account_to(
        &self,
        address: &Address,
        target: &HashHeight,
    ) -> Result<Option<HashHeight>, PoolError>;
}

/// Requests missing snapshot blocks from the network.
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch `count` blocks ending at `start` (hash of the newest wanted
    /// block and its height).
    fn fetch(&self, start: HashHeight, count: u64);
}

/// Hook invoked after every successful write-through to the disk chain.
pub trait BlockPoolNotifier: Send + Sync {
    fn after_insert(&self, block: &SnapshotBlock);
}

/// No-op notifier for setups without a block pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl BlockPoolNotifier for NoopNotifier {
    fn after_insert(&self, _block: &SnapshotBlock) {}
}

/// No-op fetcher for setups without a network.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFetcher;

impl SnapshotFetcher for NoopFetcher {
    fn fetch(&self, _start: HashHeight, _count: u64) {}
}
