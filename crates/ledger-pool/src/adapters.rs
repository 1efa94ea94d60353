//! # Chain Adapter
//!
//! Implements the pool's [`DiskChain`] port over the real ledger chain:
//! writes go through the insertion pipeline, rollback through the chain's
//! snapshot rollback.

use crate::error::PoolError;
use crate::ports::DiskChain;
use ledger_types::{Address, HashHeight, SnapshotBlock};

impl DiskChain for ledger_chain::Chain {
    fn head(&self) -> HashHeight {
        self.latest_snapshot_block().hash_height()
    }

    fn block_at(&self, height: u64) -> Result<Option<HashHeight>, PoolError> {
        Ok(self
            .get_snapshot_by_height(height)?
            .map(|block| block.hash_height()))
    }

    fn insert_snapshot_block(&self, block: &SnapshotBlock) -> Result<(), PoolError> {
        self.insert_snapshot_block(block.clone())?;
        Ok(())
    }

    fn rollback_to(
        &self,
        height: u64,
    ) -> Result<(Vec<SnapshotBlock>, Vec<Address>), PoolError> {
        Ok(self.rollback_snapshots_to(height)?)
    }
}
