//! # Forked Chains
//!
//! A forked chain is a contiguous run of candidate snapshot blocks above a
//! `tail`, the last block already merged into the canonical chain. The
//! tail is exclusive: `blocks` holds heights `tail.height + 1 ..= head`.

use ledger_types::{Hash, HashHeight, SnapshotBlock};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// A snapshot block while the pool owns it, tagged with the fork version
/// it was last verified under.
#[derive(Debug, Clone)]
pub struct SnapshotPoolBlock {
    pub block: Arc<SnapshotBlock>,
    fork_version: u64,
}

impl SnapshotPoolBlock {
    #[must_use]
    pub fn new(block: SnapshotBlock, fork_version: u64) -> Self {
        Self {
            block: Arc::new(block),
            fork_version,
        }
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.block.height
    }

    #[must_use]
    pub fn hash(&self) -> Hash {
        self.block.hash
    }

    #[must_use]
    pub fn prev_hash(&self) -> Hash {
        self.block.prev_hash
    }

    #[must_use]
    pub fn hash_height(&self) -> HashHeight {
        HashHeight::new(self.block.hash, self.block.height)
    }

    /// Whether this block's cached verdict is still valid under `current`.
    #[must_use]
    pub fn check_fork_version(&self, current: u64) -> bool {
        self.fork_version == current
    }

    pub fn reset_fork_version(&mut self, current: u64) {
        self.fork_version = current;
    }
}

/// One branch of candidate snapshot blocks.
#[derive(Debug)]
pub struct ForkedChain {
    chain_id: Uuid,
    /// Exclusive lower bound: the last block below this chain that is
    /// already on the canonical chain.
    tail: HashHeight,
    blocks: BTreeMap<u64, SnapshotPoolBlock>,
}

impl ForkedChain {
    #[must_use]
    pub fn new(tail: HashHeight) -> Self {
        Self {
            chain_id: Uuid::new_v4(),
            tail,
            blocks: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> Uuid {
        self.chain_id
    }

    #[must_use]
    pub fn tail(&self) -> HashHeight {
        self.tail
    }

    #[must_use]
    pub fn tail_height(&self) -> u64 {
        self.tail.height
    }

    /// Height of the newest block, or the tail height when empty.
    #[must_use]
    pub fn head_height(&self) -> u64 {
        self.blocks
            .last_key_value()
            .map_or(self.tail.height, |(&height, _)| height)
    }

    /// Hash of the newest block, or the tail hash when empty.
    #[must_use]
    pub fn head_hash(&self) -> Hash {
        self.blocks
            .last_key_value()
            .map_or(self.tail.hash, |(_, block)| block.hash())
    }

    #[must_use]
    pub fn head(&self) -> HashHeight {
        HashHeight::new(self.head_hash(), self.head_height())
    }

    #[must_use]
    pub fn get_block(&self, height: u64) -> Option<&SnapshotPoolBlock> {
        self.blocks.get(&height)
    }

    pub fn get_block_mut(&mut self, height: u64) -> Option<&mut SnapshotPoolBlock> {
        self.blocks.get_mut(&height)
    }

    /// The block at `height` if it is either on this chain or its tail.
    #[must_use]
    pub fn hash_at(&self, height: u64) -> Option<Hash> {
        if height == self.tail.height {
            return Some(self.tail.hash);
        }
        self.blocks.get(&height).map(SnapshotPoolBlock::hash)
    }

    /// Clones of the pending blocks at or below `height`, ascending.
    ///
    /// A chain forking off this one mid-history carries these along so its
    /// own view reaches back to a canonical block.
    #[must_use]
    pub fn blocks_through(&self, height: u64) -> Vec<SnapshotPoolBlock> {
        self.blocks
            .range(..=height)
            .map(|(_, block)| block.clone())
            .collect()
    }

    /// Append a block that links to the current head.
    ///
    /// Returns false (and drops nothing) when the block does not link.
    pub fn try_append(&mut self, block: SnapshotPoolBlock) -> bool {
        if block.height() != self.head_height() + 1 || block.prev_hash() != self.head_hash() {
            return false;
        }
        self.blocks.insert(block.height(), block);
        true
    }

    /// Move the tail up to an inserted block, dropping it from the pending
    /// set.
    pub fn advance_tail(&mut self, to: HashHeight) {
        self.blocks.remove(&to.height);
        self.tail = to;
    }

    /// Reset the tail (used when the canonical chain moved underneath this
    /// chain), dropping any pending block at or below it.
    pub fn reset_tail(&mut self, tail: HashHeight) {
        self.blocks.retain(|&height, _| height > tail.height);
        self.tail = tail;
    }

    /// Number of pending blocks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    /// Whether heights `tail + 1 ..= head` are all present.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        let mut expected = self.tail.height + 1;
        for &height in self.blocks.keys() {
            if height != expected {
                return false;
            }
            expected += 1;
        }
        true
    }
}
