//! # Chain
//!
//! The assembled ledger: all stores behind one façade, the synchronous
//! insertion pipeline over them, rollback for the snapshot pool, and the
//! read contract consumed by index builders.
//!
//! Locking: the caller serializes insertions. The per-store locks below
//! only isolate readers running concurrently with an insert; no lock is
//! held across more than one store except by the inserter itself.

use crate::cache::ChainCache;
use crate::config::ChainConfig;
use crate::error::{format_lack_block, InsertError};
use crate::fatal::crit;
use crate::flusher::Flusher;
use crate::ports::{FileKvStore, InMemoryKvStore, KeyValueStore, StoreError};
use crate::snapshot_chain::SnapshotChain;
use crate::store::{BlockDb, IndexDb, StateDb};
use ledger_bus::{LedgerEvent, LedgerEventBus};
use ledger_types::{
    Account, AccountBlock, Address, BlockEvent, ChainError, Hash, HashHeight, SnapshotBlock,
    SnapshotChunk, SnapshotContent, VmAccountBlock,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// The ledger chain façade.
pub struct Chain {
    cache: RwLock<ChainCache>,
    block_db: Mutex<BlockDb>,
    index_db: Mutex<IndexDb>,
    state_db: Mutex<StateDb>,
    snapshot_chain: Mutex<SnapshotChain>,
    flusher: Flusher,
    bus: Arc<LedgerEventBus>,
}

impl Chain {
    /// Assemble a chain from four already-opened key-value stores.
    pub fn new(
        block_store: Box<dyn KeyValueStore>,
        index_store: Box<dyn KeyValueStore>,
        state_store: Box<dyn KeyValueStore>,
        snapshot_store: Box<dyn KeyValueStore>,
        bus: Arc<LedgerEventBus>,
    ) -> Result<Self, StoreError> {
        let snapshot_chain = SnapshotChain::open(snapshot_store)?;
        let latest_snapshot = snapshot_chain
            .head()
            .cloned()
            .ok_or_else(|| StoreError::Corrupted("snapshot chain opened without a head".into()))?;
        let cache = ChainCache::new(latest_snapshot);
        Ok(Self {
            cache: RwLock::new(cache),
            block_db: Mutex::new(BlockDb::open(block_store)?),
            index_db: Mutex::new(IndexDb::open(index_store)?),
            state_db: Mutex::new(StateDb::open(state_store)?),
            snapshot_chain: Mutex::new(snapshot_chain),
            flusher: Flusher,
            bus,
        })
    }

    /// Open an on-disk chain under the configured data directory.
    pub fn open(config: &ChainConfig, bus: Arc<LedgerEventBus>) -> Result<Self, StoreError> {
        let chain = Self::new(
            Box::new(FileKvStore::open(config.store_path("block.db"))?),
            Box::new(FileKvStore::open(config.store_path("index.db"))?),
            Box::new(FileKvStore::open(config.store_path("state.db"))?),
            Box::new(FileKvStore::open(config.store_path("snapshot.db"))?),
            bus,
        )?;
        // Genesis bootstrap must be durable even if the process stops before
        // the first insertion.
        chain.flush_all();
        info!(data_dir = %config.data_dir.display(), "chain opened");
        Ok(chain)
    }

    /// Open an ephemeral in-memory chain (tests, tooling).
    pub fn in_memory(bus: Arc<LedgerEventBus>) -> Self {
        Self::new(
            Box::new(InMemoryKvStore::new()),
            Box::new(InMemoryKvStore::new()),
            Box::new(InMemoryKvStore::new()),
            Box::new(InMemoryKvStore::new()),
            bus,
        )
        .expect("in-memory stores cannot fail to open")
    }

    // =========================================================================
    // INSERTION PIPELINE
    // =========================================================================

    /// Insert one account block with its state delta.
    ///
    /// Fires the prepare event, writes cache → index DB → state DB, then
    /// fires the post event. A failure after the first store write is fatal:
    /// the stores would disagree and no restartless recovery exists.
    pub fn insert_account_block(&self, vm_block: VmAccountBlock) {
        let list: Arc<[VmAccountBlock]> = Arc::from(vec![vm_block]);
        self.bus
            .publish(LedgerEvent::PrepareInsertAccountBlocks(Arc::clone(&list)));

        let vm_block = &list[0];
        let block = &vm_block.block;
        debug!(
            hash = %ledger_types::short_hash(&block.hash),
            height = block.height,
            "insert account block"
        );

        self.cache.write().insert_account_block(block.clone());

        if let Err(err) = self.index_db.lock().insert_account_block(block) {
            crit(
                "insert_account_block",
                &format!(
                    "index db insert failed: {err}, block hash {}",
                    ledger_types::hex_hash(&block.hash)
                ),
            );
        }

        if let Err(err) = self.state_db.lock().write(vm_block) {
            crit(
                "insert_account_block",
                &format!(
                    "state db write failed: {err}, block hash {}",
                    ledger_types::hex_hash(&block.hash)
                ),
            );
        }

        self.bus.publish(LedgerEvent::InsertAccountBlocks(list));
    }

    /// Insert one snapshot block, confirming the unconfirmed account blocks
    /// it pins and deleting the ones it invalidates.
    ///
    /// Returns the invalidated blocks.
    pub fn insert_snapshot_block(
        &self,
        snapshot_block: SnapshotBlock,
    ) -> Result<Vec<AccountBlock>, InsertError> {
        {
            let head = self.latest_snapshot_block();
            if snapshot_block.height != head.height + 1 || snapshot_block.prev_hash != head.hash {
                return Err(InsertError::OutOfOrder {
                    height: snapshot_block.height,
                    head_height: head.height,
                });
            }
        }

        let confirmed = self.get_blocks_to_be_confirmed(&snapshot_block.snapshot_content)?;

        let sb_list: Arc<[SnapshotBlock]> = Arc::from(vec![snapshot_block.clone()]);
        self.bus
            .publish(LedgerEvent::PrepareInsertSnapshotBlocks(Arc::clone(&sb_list)));

        let chunk = SnapshotChunk {
            snapshot_block: snapshot_block.clone(),
            account_blocks: confirmed,
        };

        let (block_locations, snapshot_location) =
            match self.block_db.lock().write_chunk(&chunk) {
                Ok(locations) => locations,
                Err(err) => crit(
                    "insert_snapshot_block",
                    &format!(
                        "block db chunk write failed: {err}, snapshot {}",
                        ledger_types::hex_hash(&snapshot_block.hash)
                    ),
                ),
            };

        if let Err(err) = self.index_db.lock().insert_snapshot_block(
            &chunk.snapshot_block,
            &chunk.account_blocks,
            snapshot_location,
            &block_locations,
        ) {
            crit(
                "insert_snapshot_block",
                &format!("index db insert failed: {err}"),
            );
        }

        if let Err(err) = self
            .snapshot_chain
            .lock()
            .insert_chain(snapshot_block.clone())
        {
            crit(
                "insert_snapshot_block",
                &format!("snapshot chain insert failed: {err}"),
            );
        }

        {
            let mut cache = self.cache.write();
            let confirmed_hashes: Vec<Hash> =
                chunk.account_blocks.iter().map(|b| b.hash).collect();
            cache.remove_blocks(&confirmed_hashes);
            cache.set_latest_snapshot(snapshot_block.clone());
        }

        if let Err(err) = self.state_db.lock().commit_snapshot(&snapshot_block) {
            crit(
                "insert_snapshot_block",
                &format!("state db commit failed: {err}"),
            );
        }

        // Anything still unconfirmed on a pinned account conflicts with the
        // snapshot and is deleted as invalid.
        let invalid = self
            .cache
            .write()
            .take_invalid(&snapshot_block.snapshot_content);
        if !invalid.is_empty() {
            debug!(count = invalid.len(), "deleting invalidated account blocks");
            self.delete_account_blocks(&invalid);
        }

        self.flush_all();

        self.bus.publish(LedgerEvent::InsertSnapshotBlocks {
            blocks: sb_list,
            invalidated: Arc::from(invalid.clone()),
        });

        Ok(invalid)
    }

    /// The account blocks an incoming snapshot would confirm: every
    /// unconfirmed block at or below its account's pinned height.
    ///
    /// Errors with a full diagnostic when any pinned height cannot be
    /// located in the unconfirmed cache.
    pub fn get_blocks_to_be_confirmed(
        &self,
        content: &SnapshotContent,
    ) -> Result<Vec<AccountBlock>, InsertError> {
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let blocks = self.cache.read().unconfirmed_blocks();
        let mut to_confirm = Vec::with_capacity(blocks.len());
        let mut finish_count = 0usize;

        for block in &blocks {
            if let Some(hash_height) = content.get(&block.account_address) {
                if block.height < hash_height.height {
                    to_confirm.push(block.clone());
                } else if block.height == hash_height.height {
                    to_confirm.push(block.clone());
                    finish_count += 1;
                }
            }
            if finish_count >= content.len() {
                return Ok(to_confirm);
            }
        }

        Err(InsertError::LackBlock {
            diagnostic: format_lack_block(content, &blocks),
        })
    }

    /// Unindex the blocks, revert their state deltas and drop them from the
    /// cache. Appends one `Delete` event covering all hashes.
    fn delete_account_blocks(&self, blocks: &[AccountBlock]) {
        if let Err(err) = self.index_db.lock().delete_account_blocks(blocks) {
            crit(
                "delete_account_blocks",
                &format!("index db delete failed: {err}"),
            );
        }

        // Undo newest-first so each account's journal unwinds in order.
        let mut by_height_desc: Vec<&AccountBlock> = blocks.iter().collect();
        by_height_desc.sort_by(|a, b| b.height.cmp(&a.height));
        for block in by_height_desc {
            if let Err(err) = self.state_db.lock().delete_block(block) {
                crit(
                    "delete_account_blocks",
                    &format!("state db undo failed: {err}"),
                );
            }
        }

        let hashes: Vec<Hash> = blocks.iter().map(|b| b.hash).collect();
        self.cache.write().remove_blocks(&hashes);
    }

    // =========================================================================
    // ROLLBACK (driven by the snapshot pool fork switch)
    // =========================================================================

    /// Roll the snapshot chain back so `height` becomes the head.
    ///
    /// Removes every later snapshot newest-first, deletes the account blocks
    /// those snapshots confirmed (emitting `Delete` events) and returns the
    /// removed snapshots in ascending order together with the affected
    /// addresses.
    pub fn rollback_snapshots_to(
        &self,
        height: u64,
    ) -> Result<(Vec<SnapshotBlock>, Vec<Address>), ChainError> {
        let head_height = match self.snapshot_chain.lock().head() {
            Some(head) => head.height,
            None => return Ok((Vec::new(), Vec::new())),
        };
        if head_height <= height {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut removed_snapshots = Vec::new();
        let mut removed_blocks: Vec<AccountBlock> = Vec::new();
        let mut affected: BTreeSet<Address> = BTreeSet::new();
        let mut min_chunk_seq = u64::MAX;

        for rollback_height in (height + 1..=head_height).rev() {
            let snapshot = self
                .snapshot_chain
                .lock()
                .get_by_height(rollback_height)?
                .ok_or_else(|| {
                    ChainError::Store(format!("snapshot missing at height {rollback_height}"))
                })?;

            if let Some(location) = self.index_db.lock().get_snapshot_location(&snapshot.hash)? {
                if let Some(chunk) = self.block_db.lock().read_chunk(location.chunk_seq)? {
                    removed_blocks.extend(chunk.account_blocks);
                }
                min_chunk_seq = min_chunk_seq.min(location.chunk_seq);
            }

            affected.extend(snapshot.snapshot_content.keys().copied());
            self.index_db.lock().remove_snapshot(&snapshot.hash)?;
            self.snapshot_chain.lock().remove_chain(&snapshot)?;
            removed_snapshots.push(snapshot);
        }

        if min_chunk_seq != u64::MAX {
            self.block_db.lock().rollback_to(min_chunk_seq - 1)?;
        }

        if !removed_blocks.is_empty() {
            self.index_db.lock().delete_account_blocks(&removed_blocks)?;
            let mut by_height_desc: Vec<&AccountBlock> = removed_blocks.iter().collect();
            by_height_desc.sort_by(|a, b| b.height.cmp(&a.height));
            for block in by_height_desc {
                self.state_db.lock().delete_block(block)?;
            }
        }

        // The canonical chain is never rolled back past genesis, so a head
        // survives every rollback this method performs.
        let new_head = self
            .snapshot_chain
            .lock()
            .head()
            .cloned()
            .ok_or_else(|| ChainError::Store("rollback removed the whole snapshot chain".into()))?;
        self.state_db.lock().commit_snapshot(&new_head)?;
        self.cache.write().set_latest_snapshot(new_head);

        self.flush_all();

        removed_snapshots.reverse();
        info!(
            to_height = height,
            snapshots = removed_snapshots.len(),
            blocks = removed_blocks.len(),
            "snapshot chain rolled back"
        );
        Ok((removed_snapshots, affected.into_iter().collect()))
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Latest snapshot block on the canonical chain.
    #[must_use]
    pub fn latest_snapshot_block(&self) -> SnapshotBlock {
        self.cache.read().latest_snapshot().clone()
    }

    pub fn get_snapshot_by_height(
        &self,
        height: u64,
    ) -> Result<Option<SnapshotBlock>, ChainError> {
        Ok(self.snapshot_chain.lock().get_by_height(height)?)
    }

    pub fn get_snapshot_by_hash_height(
        &self,
        hash_height: &HashHeight,
    ) -> Result<Option<SnapshotBlock>, ChainError> {
        Ok(self.snapshot_chain.lock().get_by_hash_height(hash_height)?)
    }

    /// All currently unconfirmed account blocks, insertion order.
    #[must_use]
    pub fn unconfirmed_blocks(&self) -> Vec<AccountBlock> {
        self.cache.read().unconfirmed_blocks()
    }

    /// Latest block per account as each store sees it: (index DB, cache,
    /// state DB). Index and state agree after every insertion; the cache
    /// only covers unconfirmed blocks.
    pub fn latest_block_views(
        &self,
        address: &Address,
    ) -> Result<
        (
            Option<HashHeight>,
            Option<HashHeight>,
            Option<HashHeight>,
        ),
        ChainError,
    > {
        let index_view = {
            let index_db = self.index_db.lock();
            match index_db.get_account(address)? {
                Some(account) => index_db.get_latest_block(account.account_id)?,
                None => None,
            }
        };
        let cache_view = self.cache.read().latest_unconfirmed(address);
        let state_view = self.state_db.lock().get_latest_block(address)?;
        Ok((index_view, cache_view, state_view))
    }

    fn flush_all(&self) {
        self.flusher.flush(
            &mut self.block_db.lock(),
            &mut self.index_db.lock(),
            &mut self.state_db.lock(),
            &mut self.snapshot_chain.lock(),
        );
    }
}

impl ledger_types::Chain for Chain {
    fn latest_block_event_id(&self) -> Result<u64, ChainError> {
        Ok(self.index_db.lock().latest_event_id()?)
    }

    fn get_event(&self, event_id: u64) -> Result<Option<BlockEvent>, ChainError> {
        Ok(self.index_db.lock().get_event(event_id)?)
    }

    fn get_account_block_by_hash(&self, hash: &Hash) -> Result<Option<AccountBlock>, ChainError> {
        if let Some(block) = self.cache.read().get_unconfirmed_by_hash(hash) {
            return Ok(Some(block.clone()));
        }
        let Some(location) = self.index_db.lock().get_block_location(hash)? else {
            return Ok(None);
        };
        Ok(self.block_db.lock().get_account_block(location)?)
    }

    fn get_account(&self, address: &Address) -> Result<Account, ChainError> {
        self.index_db
            .lock()
            .get_account(address)?
            .ok_or(ChainError::AccountNotFound { address: *address })
    }

    fn is_account_block_existed(&self, hash: &Hash) -> Result<bool, ChainError> {
        if self.cache.read().contains(hash) {
            return Ok(true);
        }
        Ok(self.index_db.lock().has_block(hash)?)
    }

    fn is_genesis_account_block(&self, block: &AccountBlock) -> bool {
        crate::genesis::GENESIS_ACCOUNT_BLOCK_HASHES.contains(&block.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{BatchOperation, InMemoryKvStore};
    use ledger_types::{AccountBlockBody, StateDelta, U256, ZERO_HASH};

    /// Store that accepts reads but fails every write, to drive the
    /// mid-pipeline fatal path.
    #[derive(Default)]
    struct FailingKvStore;

    impl KeyValueStore for FailingKvStore {
        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }
        fn put(&mut self, _key: &[u8], _value: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }
        fn delete(&mut self, _key: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }
        fn atomic_batch_write(&mut self, _ops: Vec<BatchOperation>) -> Result<(), StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }
        fn prefix_scan(&self, _prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
            Ok(Vec::new())
        }
        fn flush(&mut self) -> Result<(), StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }
    }

    fn vm_block() -> VmAccountBlock {
        let mut block = AccountBlock {
            hash: ZERO_HASH,
            prev_hash: ZERO_HASH,
            account_address: [1u8; 20],
            height: 1,
            token_id: [2u8; 32],
            body: AccountBlockBody::Send {
                to_address: [3u8; 20],
                amount: U256::from(1u64),
            },
        };
        block.hash = block.compute_hash();
        VmAccountBlock {
            block,
            state: StateDelta::default(),
        }
    }

    #[test]
    #[should_panic(expected = "fatal store inconsistency")]
    fn index_db_failure_mid_pipeline_is_fatal() {
        let chain = Chain::new(
            Box::new(InMemoryKvStore::new()),
            Box::new(FailingKvStore),
            Box::new(InMemoryKvStore::new()),
            Box::new(InMemoryKvStore::new()),
            Arc::new(LedgerEventBus::new()),
        )
        .unwrap();

        chain.insert_account_block(vm_block());
    }

    #[test]
    #[should_panic(expected = "fatal store inconsistency")]
    fn state_db_failure_mid_pipeline_is_fatal() {
        let chain = Chain::new(
            Box::new(InMemoryKvStore::new()),
            Box::new(InMemoryKvStore::new()),
            Box::new(FailingKvStore),
            Box::new(InMemoryKvStore::new()),
            Arc::new(LedgerEventBus::new()),
        )
        .unwrap();

        chain.insert_account_block(vm_block());
    }
}
