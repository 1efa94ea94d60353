//! # Snapshot Chain Head
//!
//! The thin persistent wrapper owning the single variable "current head
//! snapshot block".
//!
//! On open, a store that already has a head must contain the code-embedded
//! genesis at height 1; a mismatch means the data directory belongs to a
//! different network and the process aborts. An empty store is bootstrapped
//! by writing genesis and pointing the head at it.

use crate::fatal::crit;
use crate::genesis::genesis_snapshot_block;
use crate::ports::{BatchOperation, KeyValueStore, StoreError};
use crate::store::key;
use ledger_types::{Hash, HashHeight, SnapshotBlock};

const KP_SNAPSHOT_BY_HEIGHT: u8 = 1;
const KP_HEAD: u8 = 2;
const KP_HEIGHT_BY_HASH: u8 = 3;

/// The canonical persisted snapshot chain.
pub struct SnapshotChain {
    store: Box<dyn KeyValueStore>,
    /// `None` only after the whole chain has been removed; open always
    /// leaves a head behind.
    head: Option<SnapshotBlock>,
}

impl SnapshotChain {
    /// Open the chain, verifying or bootstrapping genesis.
    pub fn open(store: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let genesis = genesis_snapshot_block();
        let mut chain = Self { store, head: None };

        match chain.stored_head()? {
            Some(head_pointer) => {
                let stored_genesis = chain.get_by_height(genesis.height)?;
                match stored_genesis {
                    Some(stored) if stored.hash == genesis.hash => {}
                    Some(stored) => crit(
                        "SnapshotChain::open",
                        &format!(
                            "genesis mismatch: code {}, store {}",
                            ledger_types::hex_hash(&genesis.hash),
                            ledger_types::hex_hash(&stored.hash)
                        ),
                    ),
                    None => crit("SnapshotChain::open", "head present but genesis missing"),
                }
                let head = chain.get_by_height(head_pointer.height)?.unwrap_or_else(|| {
                    crit(
                        "SnapshotChain::open",
                        &format!("head block missing at height {}", head_pointer.height),
                    )
                });
                chain.head = Some(head);
            }
            None => {
                chain.put_block(&genesis)?;
                chain.set_head_pointer(Some(genesis.hash_height()))?;
                tracing::info!(
                    hash = %ledger_types::short_hash(&genesis.hash),
                    "bootstrapped snapshot chain with genesis"
                );
                chain.head = Some(genesis);
            }
        }
        Ok(chain)
    }

    /// The current head snapshot block; `None` when the chain has been
    /// fully removed.
    #[must_use]
    pub fn head(&self) -> Option<&SnapshotBlock> {
        self.head.as_ref()
    }

    /// Append a block and advance the head.
    pub fn insert_chain(&mut self, block: SnapshotBlock) -> Result<(), StoreError> {
        self.put_block(&block)?;
        self.set_head_pointer(Some(block.hash_height()))?;
        self.head = Some(block);
        Ok(())
    }

    /// Delete a block and reset the head to its predecessor, or null when
    /// it has none.
    pub fn remove_chain(&mut self, block: &SnapshotBlock) -> Result<(), StoreError> {
        let prev = self.get_by_hash(&block.prev_hash)?;

        self.store.atomic_batch_write(vec![
            BatchOperation::delete(key(KP_SNAPSHOT_BY_HEIGHT, &[&block.height.to_be_bytes()])),
            BatchOperation::delete(key(KP_HEIGHT_BY_HASH, &[&block.hash])),
        ])?;

        self.set_head_pointer(prev.as_ref().map(SnapshotBlock::hash_height))?;
        self.head = prev;
        Ok(())
    }

    pub fn get_by_height(&self, height: u64) -> Result<Option<SnapshotBlock>, StoreError> {
        match self
            .store
            .get(&key(KP_SNAPSHOT_BY_HEIGHT, &[&height.to_be_bytes()]))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| StoreError::Corrupted(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Fetch by `(hash, height)`; `None` unless both match the stored block.
    pub fn get_by_hash_height(
        &self,
        hash_height: &HashHeight,
    ) -> Result<Option<SnapshotBlock>, StoreError> {
        if let Some(head) = &self.head {
            if head.height == hash_height.height && head.hash == hash_height.hash {
                return Ok(Some(head.clone()));
            }
        }
        match self.get_by_height(hash_height.height)? {
            Some(block) if block.hash == hash_height.hash => Ok(Some(block)),
            _ => Ok(None),
        }
    }

    pub fn get_by_hash(&self, hash: &Hash) -> Result<Option<SnapshotBlock>, StoreError> {
        let Some(bytes) = self.store.get(&key(KP_HEIGHT_BY_HASH, &[hash]))? else {
            return Ok(None);
        };
        let height = u64::from_be_bytes(
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Corrupted("height-by-hash entry".into()))?,
        );
        self.get_by_height(height)
    }

    fn stored_head(&self) -> Result<Option<HashHeight>, StoreError> {
        match self.store.get(&key(KP_HEAD, &[]))? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| StoreError::Corrupted(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    fn set_head_pointer(&mut self, head: Option<HashHeight>) -> Result<(), StoreError> {
        match head {
            Some(hash_height) => self.store.put(
                &key(KP_HEAD, &[]),
                &bincode::serialize(&hash_height)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            ),
            None => self.store.delete(&key(KP_HEAD, &[])),
        }
    }

    fn put_block(&mut self, block: &SnapshotBlock) -> Result<(), StoreError> {
        let bytes =
            bincode::serialize(block).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.atomic_batch_write(vec![
            BatchOperation::put(
                key(KP_SNAPSHOT_BY_HEIGHT, &[&block.height.to_be_bytes()]),
                bytes,
            ),
            BatchOperation::put(
                key(KP_HEIGHT_BY_HASH, &[&block.hash]),
                block.height.to_be_bytes().to_vec(),
            ),
        ])
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.store.flush()
    }
}
