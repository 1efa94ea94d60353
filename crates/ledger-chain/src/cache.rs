//! # Chain Cache
//!
//! Front for recent and unconfirmed data: the account blocks inserted since
//! the last snapshot, in insertion order, plus the latest snapshot pointer.
//! Only the insertion pipeline writes here.

use ledger_types::{AccountBlock, Address, Hash, HashHeight, SnapshotBlock, SnapshotContent};
use std::collections::HashSet;

/// In-memory recent-data cache.
pub struct ChainCache {
    /// Unconfirmed account blocks in insertion order.
    unconfirmed: Vec<AccountBlock>,
    /// Latest snapshot block on the canonical chain.
    latest_snapshot: SnapshotBlock,
}

impl ChainCache {
    #[must_use]
    pub fn new(latest_snapshot: SnapshotBlock) -> Self {
        Self {
            unconfirmed: Vec::new(),
            latest_snapshot,
        }
    }

    pub fn insert_account_block(&mut self, block: AccountBlock) {
        self.unconfirmed.push(block);
    }

    /// All unconfirmed blocks, insertion order.
    #[must_use]
    pub fn unconfirmed_blocks(&self) -> Vec<AccountBlock> {
        self.unconfirmed.clone()
    }

    #[must_use]
    pub fn get_unconfirmed_by_hash(&self, hash: &Hash) -> Option<&AccountBlock> {
        self.unconfirmed.iter().find(|b| &b.hash == hash)
    }

    #[must_use]
    pub fn contains(&self, hash: &Hash) -> bool {
        self.get_unconfirmed_by_hash(hash).is_some()
    }

    /// Newest unconfirmed block of one account, if any.
    #[must_use]
    pub fn latest_unconfirmed(&self, address: &Address) -> Option<HashHeight> {
        self.unconfirmed
            .iter()
            .filter(|b| &b.account_address == address)
            .max_by_key(|b| b.height)
            .map(|b| HashHeight::new(b.hash, b.height))
    }

    /// Drop the given hashes from the unconfirmed set.
    pub fn remove_blocks(&mut self, hashes: &[Hash]) {
        let removed: HashSet<&Hash> = hashes.iter().collect();
        self.unconfirmed.retain(|b| !removed.contains(&b.hash));
    }

    /// Remove and return every unconfirmed block on an account the snapshot
    /// pinned. Called after the confirmed set has been removed, so anything
    /// still present on a pinned account conflicts with the snapshot.
    pub fn take_invalid(&mut self, content: &SnapshotContent) -> Vec<AccountBlock> {
        let mut invalid = Vec::new();
        self.unconfirmed.retain(|block| {
            if content.contains_key(&block.account_address) {
                invalid.push(block.clone());
                false
            } else {
                true
            }
        });
        invalid
    }

    #[must_use]
    pub fn latest_snapshot(&self) -> &SnapshotBlock {
        &self.latest_snapshot
    }

    pub fn set_latest_snapshot(&mut self, snapshot: SnapshotBlock) {
        self.latest_snapshot = snapshot;
    }

    #[must_use]
    pub fn unconfirmed_len(&self) -> usize {
        self.unconfirmed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::genesis_snapshot_block;
    use ledger_types::{AccountBlockBody, U256, ZERO_HASH};

    fn block(address: Address, height: u64) -> AccountBlock {
        let mut block = AccountBlock {
            hash: ZERO_HASH,
            prev_hash: ZERO_HASH,
            account_address: address,
            height,
            token_id: [2u8; 32],
            body: AccountBlockBody::Send {
                to_address: [3u8; 20],
                amount: U256::from(height),
            },
        };
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn test_latest_unconfirmed_per_account() {
        let mut cache = ChainCache::new(genesis_snapshot_block());
        let a1 = block([1u8; 20], 1);
        let a2 = block([1u8; 20], 2);
        let b1 = block([2u8; 20], 1);
        cache.insert_account_block(a1);
        cache.insert_account_block(a2.clone());
        cache.insert_account_block(b1);

        assert_eq!(
            cache.latest_unconfirmed(&[1u8; 20]),
            Some(HashHeight::new(a2.hash, 2))
        );
        assert_eq!(cache.latest_unconfirmed(&[9u8; 20]), None);
    }

    #[test]
    fn test_take_invalid_only_touches_pinned_accounts() {
        let mut cache = ChainCache::new(genesis_snapshot_block());
        let pinned = block([1u8; 20], 7);
        let unpinned = block([2u8; 20], 3);
        cache.insert_account_block(pinned.clone());
        cache.insert_account_block(unpinned.clone());

        let mut content = SnapshotContent::new();
        content.insert([1u8; 20], HashHeight::new([0u8; 32], 6));

        let invalid = cache.take_invalid(&content);
        assert_eq!(invalid, vec![pinned]);
        assert_eq!(cache.unconfirmed_blocks(), vec![unpinned]);
    }

    #[test]
    fn test_remove_blocks() {
        let mut cache = ChainCache::new(genesis_snapshot_block());
        let b1 = block([1u8; 20], 1);
        let b2 = block([1u8; 20], 2);
        cache.insert_account_block(b1.clone());
        cache.insert_account_block(b2.clone());

        cache.remove_blocks(&[b1.hash]);
        assert!(!cache.contains(&b1.hash));
        assert!(cache.contains(&b2.hash));
        assert_eq!(cache.unconfirmed_len(), 1);
    }
}
