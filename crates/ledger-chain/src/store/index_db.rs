//! # Index DB
//!
//! Secondary indexes over the block store: hash → location, per-account
//! height → hash, the account registry, latest block per account, snapshot
//! locations, and the append-only block event log consumed by index
//! builders.

use crate::ports::{BatchOperation, KeyValueStore, StoreError};
use crate::store::{key, Location};
use ledger_types::{
    Account, AccountBlock, Address, BlockEvent, EventKind, Hash, HashHeight, SnapshotBlock,
};
use std::collections::BTreeMap;

const KP_BLOCK_LOCATION: u8 = 1;
const KP_HEIGHT_TO_HASH: u8 = 2;
const KP_ACCOUNT_ID: u8 = 3;
const KP_LATEST_BLOCK: u8 = 4;
const KP_NEXT_ACCOUNT_ID: u8 = 5;
const KP_EVENT: u8 = 6;
const KP_LATEST_EVENT_ID: u8 = 7;
const KP_SNAPSHOT_LOCATION: u8 = 8;

/// The index database.
pub struct IndexDb {
    store: Box<dyn KeyValueStore>,
}

impl IndexDb {
    pub fn open(store: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Ok(Self { store })
    }

    // ---- account registry ----

    /// Resolve an address, registering it with the next dense id on first
    /// sight.
    pub fn get_or_register_account(&mut self, address: &Address) -> Result<Account, StoreError> {
        if let Some(account) = self.get_account(address)? {
            return Ok(account);
        }

        let next_key = key(KP_NEXT_ACCOUNT_ID, &[]);
        let account_id = match self.store.get(&next_key)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 1,
        };
        self.store.atomic_batch_write(vec![
            BatchOperation::put(
                key(KP_ACCOUNT_ID, &[address]),
                account_id.to_be_bytes().to_vec(),
            ),
            BatchOperation::put(next_key, (account_id + 1).to_be_bytes().to_vec()),
        ])?;
        Ok(Account {
            account_id,
            address: *address,
        })
    }

    pub fn get_account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        let Some(bytes) = self.store.get(&key(KP_ACCOUNT_ID, &[address]))? else {
            return Ok(None);
        };
        Ok(Some(Account {
            account_id: decode_u64(&bytes)?,
            address: *address,
        }))
    }

    // ---- account blocks ----

    /// Index a freshly inserted account block and append its `Add` event.
    pub fn insert_account_block(&mut self, block: &AccountBlock) -> Result<(), StoreError> {
        let account = self.get_or_register_account(&block.account_address)?;
        let account_id = account.account_id.to_be_bytes();

        let mut ops = vec![
            BatchOperation::put(
                key(KP_HEIGHT_TO_HASH, &[&account_id, &block.height.to_be_bytes()]),
                block.hash.to_vec(),
            ),
            BatchOperation::put(
                key(KP_LATEST_BLOCK, &[&account_id]),
                encode(&HashHeight::new(block.hash, block.height))?,
            ),
        ];
        ops.extend(self.event_ops(EventKind::Add, vec![block.hash])?);
        self.store.atomic_batch_write(ops)
    }

    /// Record the physical locations a chunk write produced.
    pub fn insert_snapshot_block(
        &mut self,
        snapshot_block: &SnapshotBlock,
        account_blocks: &[AccountBlock],
        snapshot_location: Location,
        block_locations: &[Location],
    ) -> Result<(), StoreError> {
        debug_assert_eq!(account_blocks.len(), block_locations.len());

        let mut ops = vec![BatchOperation::put(
            key(KP_SNAPSHOT_LOCATION, &[&snapshot_block.hash]),
            encode(&snapshot_location)?,
        )];
        for (block, location) in account_blocks.iter().zip(block_locations) {
            ops.push(BatchOperation::put(
                key(KP_BLOCK_LOCATION, &[&block.hash]),
                encode(location)?,
            ));
        }
        self.store.atomic_batch_write(ops)
    }

    /// Unindex rolled-back or invalidated blocks and append one `Delete`
    /// event covering all of them.
    ///
    /// Latest-block pointers rewind to the highest surviving height per
    /// account.
    pub fn delete_account_blocks(&mut self, blocks: &[AccountBlock]) -> Result<(), StoreError> {
        if blocks.is_empty() {
            return Ok(());
        }

        let mut ops = Vec::new();
        let mut min_height_per_account: BTreeMap<Address, u64> = BTreeMap::new();
        let mut hashes = Vec::with_capacity(blocks.len());

        for block in blocks {
            let account = self.get_or_register_account(&block.account_address)?;
            let account_id = account.account_id.to_be_bytes();
            ops.push(BatchOperation::delete(key(
                KP_HEIGHT_TO_HASH,
                &[&account_id, &block.height.to_be_bytes()],
            )));
            ops.push(BatchOperation::delete(key(KP_BLOCK_LOCATION, &[&block.hash])));
            hashes.push(block.hash);

            min_height_per_account
                .entry(block.account_address)
                .and_modify(|h| *h = (*h).min(block.height))
                .or_insert(block.height);
        }

        for (address, min_height) in min_height_per_account {
            let account = self.get_or_register_account(&address)?;
            let account_id = account.account_id.to_be_bytes();
            if min_height <= ledger_types::FIRST_HEIGHT {
                ops.push(BatchOperation::delete(key(KP_LATEST_BLOCK, &[&account_id])));
                continue;
            }
            let surviving_height = min_height - 1;
            match self.get_hash_by_height(account.account_id, surviving_height)? {
                Some(hash) => ops.push(BatchOperation::put(
                    key(KP_LATEST_BLOCK, &[&account_id]),
                    encode(&HashHeight::new(hash, surviving_height))?,
                )),
                None => ops.push(BatchOperation::delete(key(KP_LATEST_BLOCK, &[&account_id]))),
            }
        }

        ops.extend(self.event_ops(EventKind::Delete, hashes)?);
        self.store.atomic_batch_write(ops)
    }

    /// Drop the location entry of a rolled-back snapshot.
    pub fn remove_snapshot(&mut self, snapshot_hash: &Hash) -> Result<(), StoreError> {
        self.store.delete(&key(KP_SNAPSHOT_LOCATION, &[snapshot_hash]))
    }

    // ---- reads ----

    pub fn get_hash_by_height(
        &self,
        account_id: u64,
        height: u64,
    ) -> Result<Option<Hash>, StoreError> {
        let Some(bytes) = self.store.get(&key(
            KP_HEIGHT_TO_HASH,
            &[&account_id.to_be_bytes(), &height.to_be_bytes()],
        ))?
        else {
            return Ok(None);
        };
        let hash: Hash = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Corrupted("height index entry".into()))?;
        Ok(Some(hash))
    }

    pub fn get_latest_block(&self, account_id: u64) -> Result<Option<HashHeight>, StoreError> {
        let Some(bytes) = self
            .store
            .get(&key(KP_LATEST_BLOCK, &[&account_id.to_be_bytes()]))?
        else {
            return Ok(None);
        };
        Ok(Some(decode(&bytes)?))
    }

    pub fn get_block_location(&self, hash: &Hash) -> Result<Option<Location>, StoreError> {
        match self.store.get(&key(KP_BLOCK_LOCATION, &[hash]))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool, StoreError> {
        self.store.exists(&key(KP_BLOCK_LOCATION, &[hash]))
    }

    pub fn get_snapshot_location(&self, hash: &Hash) -> Result<Option<Location>, StoreError> {
        match self.store.get(&key(KP_SNAPSHOT_LOCATION, &[hash]))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ---- event log ----

    pub fn latest_event_id(&self) -> Result<u64, StoreError> {
        match self.store.get(&key(KP_LATEST_EVENT_ID, &[]))? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    pub fn get_event(&self, event_id: u64) -> Result<Option<BlockEvent>, StoreError> {
        match self.store.get(&key(KP_EVENT, &[&event_id.to_be_bytes()]))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn event_ops(
        &self,
        kind: EventKind,
        hashes: Vec<Hash>,
    ) -> Result<Vec<BatchOperation>, StoreError> {
        let event_id = self.latest_event_id()? + 1;
        let event = BlockEvent {
            event_id,
            kind,
            hashes,
        };
        Ok(vec![
            BatchOperation::put(key(KP_EVENT, &[&event_id.to_be_bytes()]), encode(&event)?),
            BatchOperation::put(
                key(KP_LATEST_EVENT_ID, &[]),
                event_id.to_be_bytes().to_vec(),
            ),
        ])
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.store.flush()
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Corrupted(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    Ok(u64::from_be_bytes(
        bytes
            .try_into()
            .map_err(|_| StoreError::Corrupted("u64 field".into()))?,
    ))
}
