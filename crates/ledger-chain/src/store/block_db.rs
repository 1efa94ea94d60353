//! # Block Store
//!
//! Append-only chunk log. Each record is one [`SnapshotChunk`]: a snapshot
//! block plus the account blocks it confirms, serialized with bincode and
//! protected by a CRC32 checksum. The record's sequence number plus the
//! block's offset inside the chunk is its physical [`Location`].

use crate::ports::{BatchOperation, KeyValueStore, StoreError};
use crate::store::key;
use ledger_types::{AccountBlock, SnapshotBlock, SnapshotChunk};
use serde::{Deserialize, Serialize};

const KP_CHUNK: u8 = 1;
const KP_NEXT_SEQ: u8 = 2;

/// Physical location of a block inside the chunk log.
///
/// `offset` 0 is the snapshot block of the chunk; account blocks follow at
/// 1-based offsets in chunk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub chunk_seq: u64,
    pub offset: u32,
}

impl Location {
    #[must_use]
    pub fn new(chunk_seq: u64, offset: u32) -> Self {
        Self { chunk_seq, offset }
    }
}

#[derive(Serialize, Deserialize)]
struct ChunkRecord {
    checksum: u32,
    payload: Vec<u8>,
}

/// The append-only block store.
pub struct BlockDb {
    store: Box<dyn KeyValueStore>,
    next_seq: u64,
}

impl BlockDb {
    pub fn open(store: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let next_seq = match store.get(&key(KP_NEXT_SEQ, &[]))? {
            Some(bytes) => u64::from_be_bytes(
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Corrupted("next chunk sequence".into()))?,
            ),
            None => 1,
        };
        Ok(Self { store, next_seq })
    }

    /// Append one chunk; returns the location of each confirmed account
    /// block (chunk order) and of the snapshot block.
    pub fn write_chunk(
        &mut self,
        chunk: &SnapshotChunk,
    ) -> Result<(Vec<Location>, Location), StoreError> {
        let payload = bincode::serialize(chunk).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let record = ChunkRecord {
            checksum: crc32fast::hash(&payload),
            payload,
        };
        let record_bytes =
            bincode::serialize(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let seq = self.next_seq;
        self.store.atomic_batch_write(vec![
            BatchOperation::put(key(KP_CHUNK, &[&seq.to_be_bytes()]), record_bytes),
            BatchOperation::put(key(KP_NEXT_SEQ, &[]), (seq + 1).to_be_bytes().to_vec()),
        ])?;
        self.next_seq = seq + 1;

        let snapshot_location = Location::new(seq, 0);
        let block_locations = (0..chunk.account_blocks.len())
            .map(|i| Location::new(seq, i as u32 + 1))
            .collect();
        Ok((block_locations, snapshot_location))
    }

    /// Read a whole chunk back, verifying its checksum.
    pub fn read_chunk(&self, chunk_seq: u64) -> Result<Option<SnapshotChunk>, StoreError> {
        let Some(bytes) = self.store.get(&key(KP_CHUNK, &[&chunk_seq.to_be_bytes()]))? else {
            return Ok(None);
        };
        let record: ChunkRecord =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        if crc32fast::hash(&record.payload) != record.checksum {
            return Err(StoreError::Corrupted(format!(
                "chunk {chunk_seq} checksum mismatch"
            )));
        }
        let chunk: SnapshotChunk = bincode::deserialize(&record.payload)
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;
        Ok(Some(chunk))
    }

    /// Read the account block at a location. Offset 0 addresses the
    /// snapshot block and yields `None` here.
    pub fn get_account_block(&self, location: Location) -> Result<Option<AccountBlock>, StoreError> {
        let Some(chunk) = self.read_chunk(location.chunk_seq)? else {
            return Ok(None);
        };
        if location.offset == 0 {
            return Ok(None);
        }
        Ok(chunk.account_blocks.get(location.offset as usize - 1).cloned())
    }

    /// Read the snapshot block at a location.
    pub fn get_snapshot_block(
        &self,
        location: Location,
    ) -> Result<Option<SnapshotBlock>, StoreError> {
        Ok(self.read_chunk(location.chunk_seq)?.map(|c| c.snapshot_block))
    }

    /// Drop every chunk with a sequence number above `seq`.
    pub fn rollback_to(&mut self, seq: u64) -> Result<(), StoreError> {
        if self.next_seq <= seq + 1 {
            return Ok(());
        }
        let mut ops: Vec<BatchOperation> = (seq + 1..self.next_seq)
            .map(|s| BatchOperation::delete(key(KP_CHUNK, &[&s.to_be_bytes()])))
            .collect();
        ops.push(BatchOperation::put(
            key(KP_NEXT_SEQ, &[]),
            (seq + 1).to_be_bytes().to_vec(),
        ));
        self.store.atomic_batch_write(ops)?;
        self.next_seq = seq + 1;
        Ok(())
    }

    /// Sequence number of the most recently written chunk, 0 if empty.
    #[must_use]
    pub fn latest_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryKvStore;
    use ledger_types::{AccountBlockBody, SnapshotContent, U256, ZERO_HASH};

    fn chunk(height: u64, n_blocks: u64) -> SnapshotChunk {
        let account_blocks = (1..=n_blocks)
            .map(|h| {
                let mut block = AccountBlock {
                    hash: ZERO_HASH,
                    prev_hash: ZERO_HASH,
                    account_address: [1u8; 20],
                    height: h,
                    token_id: [2u8; 32],
                    body: AccountBlockBody::Send {
                        to_address: [3u8; 20],
                        amount: U256::from(h),
                    },
                };
                block.hash = block.compute_hash();
                block
            })
            .collect();
        let mut snapshot_block = SnapshotBlock {
            hash: ZERO_HASH,
            prev_hash: ZERO_HASH,
            height,
            timestamp: 1_700_000_000,
            snapshot_content: SnapshotContent::new(),
        };
        snapshot_block.hash = snapshot_block.compute_hash();
        SnapshotChunk {
            snapshot_block,
            account_blocks,
        }
    }

    fn open_db() -> BlockDb {
        BlockDb::open(Box::new(InMemoryKvStore::new())).unwrap()
    }

    #[test]
    fn test_write_chunk_assigns_locations() {
        let mut db = open_db();
        let chunk = chunk(2, 3);

        let (block_locations, snapshot_location) = db.write_chunk(&chunk).unwrap();

        assert_eq!(snapshot_location, Location::new(1, 0));
        assert_eq!(block_locations.len(), 3);
        assert_eq!(block_locations[2], Location::new(1, 3));
        assert_eq!(db.latest_seq(), 1);
    }

    #[test]
    fn test_read_back_by_location() {
        let mut db = open_db();
        let chunk = chunk(2, 2);
        let (block_locations, snapshot_location) = db.write_chunk(&chunk).unwrap();

        let snapshot = db.get_snapshot_block(snapshot_location).unwrap().unwrap();
        assert_eq!(snapshot.hash, chunk.snapshot_block.hash);

        let block = db.get_account_block(block_locations[1]).unwrap().unwrap();
        assert_eq!(block.hash, chunk.account_blocks[1].hash);
    }

    #[test]
    fn test_rollback_drops_later_chunks() {
        let mut db = open_db();
        db.write_chunk(&chunk(2, 0)).unwrap();
        db.write_chunk(&chunk(3, 0)).unwrap();
        db.write_chunk(&chunk(4, 0)).unwrap();

        db.rollback_to(1).unwrap();

        assert_eq!(db.latest_seq(), 1);
        assert!(db.read_chunk(2).unwrap().is_none());
        assert!(db.read_chunk(1).unwrap().is_some());

        // Appending after rollback reuses the freed sequence numbers.
        let (_, snapshot_location) = db.write_chunk(&chunk(3, 0)).unwrap();
        assert_eq!(snapshot_location.chunk_seq, 2);
    }
}
