//! # State DB
//!
//! Materialized VM state: absolute balances per (account, token) and raw
//! storage writes, applied from each block's [`StateDelta`]. Every write
//! journals the values it overwrote so a rolled-back block can be undone
//! exactly.

use crate::ports::{BatchOperation, KeyValueStore, StoreError};
use crate::store::key;
use ledger_types::{
    AccountBlock, Address, Hash, HashHeight, SnapshotBlock, TokenId, U256, VmAccountBlock,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const KP_BALANCE: u8 = 1;
const KP_STORAGE: u8 = 2;
const KP_LATEST_BLOCK: u8 = 3;
const KP_UNDO: u8 = 4;
const KP_SNAPSHOT_HEIGHT: u8 = 5;

/// Journal entry recording what a block's delta overwrote.
#[derive(Debug, Serialize, Deserialize)]
struct UndoRecord {
    prev_latest: Option<HashHeight>,
    /// (token, previous balance); `None` when the key did not exist.
    balances: Vec<(TokenId, Option<U256>)>,
    /// (storage key, previous value); `None` when the key did not exist.
    storage: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

/// The state database.
pub struct StateDb {
    store: Box<dyn KeyValueStore>,
}

impl StateDb {
    pub fn open(store: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Ok(Self { store })
    }

    /// Apply one block's state delta.
    pub fn write(&mut self, vm_block: &VmAccountBlock) -> Result<(), StoreError> {
        let block = &vm_block.block;
        let address = &block.account_address;
        let mut ops = Vec::new();

        let mut undo = UndoRecord {
            prev_latest: self.get_latest_block(address)?,
            balances: Vec::with_capacity(vm_block.state.balances.len()),
            storage: Vec::with_capacity(vm_block.state.storage.len()),
        };

        for (token_id, balance) in &vm_block.state.balances {
            undo.balances
                .push((*token_id, self.get_balance(address, token_id)?));
            let mut balance_bytes = [0u8; 32];
            balance.to_big_endian(&mut balance_bytes);
            ops.push(BatchOperation::put(
                key(KP_BALANCE, &[address, token_id]),
                balance_bytes.to_vec(),
            ));
        }

        for (storage_key, value) in &vm_block.state.storage {
            undo.storage
                .push((storage_key.clone(), self.get_storage(address, storage_key)?));
            ops.push(BatchOperation::put(
                key(KP_STORAGE, &[address, storage_key]),
                value.clone(),
            ));
        }

        ops.push(BatchOperation::put(
            key(KP_LATEST_BLOCK, &[address]),
            encode(&HashHeight::new(block.hash, block.height))?,
        ));
        ops.push(BatchOperation::put(
            key(KP_UNDO, &[&block.hash]),
            encode(&undo)?,
        ));

        self.store.atomic_batch_write(ops)
    }

    /// Revert one block's delta from its undo journal.
    ///
    /// Blocks must be reverted newest-first per account.
    pub fn delete_block(&mut self, block: &AccountBlock) -> Result<(), StoreError> {
        let undo_key = key(KP_UNDO, &[&block.hash]);
        let Some(bytes) = self.store.get(&undo_key)? else {
            debug!(hash = %ledger_types::short_hash(&block.hash), "no undo record, state untouched");
            return Ok(());
        };
        let undo: UndoRecord = decode(&bytes)?;
        let address = &block.account_address;
        let mut ops = Vec::new();

        for (token_id, prev) in &undo.balances {
            match prev {
                Some(balance) => {
                    let mut balance_bytes = [0u8; 32];
                    balance.to_big_endian(&mut balance_bytes);
                    ops.push(BatchOperation::put(
                        key(KP_BALANCE, &[address, token_id]),
                        balance_bytes.to_vec(),
                    ));
                }
                None => ops.push(BatchOperation::delete(key(KP_BALANCE, &[address, token_id]))),
            }
        }

        for (storage_key, prev) in &undo.storage {
            match prev {
                Some(value) => ops.push(BatchOperation::put(
                    key(KP_STORAGE, &[address, storage_key]),
                    value.clone(),
                )),
                None => ops.push(BatchOperation::delete(key(
                    KP_STORAGE,
                    &[address, storage_key],
                ))),
            }
        }

        match &undo.prev_latest {
            Some(prev) => ops.push(BatchOperation::put(
                key(KP_LATEST_BLOCK, &[address]),
                encode(prev)?,
            )),
            None => ops.push(BatchOperation::delete(key(KP_LATEST_BLOCK, &[address]))),
        }
        ops.push(BatchOperation::delete(undo_key));

        self.store.atomic_batch_write(ops)
    }

    /// Pin the committed snapshot height.
    pub fn commit_snapshot(&mut self, snapshot_block: &SnapshotBlock) -> Result<(), StoreError> {
        self.store.put(
            &key(KP_SNAPSHOT_HEIGHT, &[]),
            &snapshot_block.height.to_be_bytes(),
        )
    }

    /// Height of the last committed snapshot, 0 if none.
    pub fn committed_snapshot_height(&self) -> Result<u64, StoreError> {
        match self.store.get(&key(KP_SNAPSHOT_HEIGHT, &[]))? {
            Some(bytes) => Ok(u64::from_be_bytes(
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Corrupted("snapshot height".into()))?,
            )),
            None => Ok(0),
        }
    }

    pub fn get_balance(
        &self,
        address: &Address,
        token_id: &TokenId,
    ) -> Result<Option<U256>, StoreError> {
        match self.store.get(&key(KP_BALANCE, &[address, token_id]))? {
            Some(bytes) => Ok(Some(U256::from_big_endian(&bytes))),
            None => Ok(None),
        }
    }

    pub fn get_storage(
        &self,
        address: &Address,
        storage_key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(&key(KP_STORAGE, &[address, storage_key]))
    }

    /// Latest block whose delta was applied for this account.
    pub fn get_latest_block(&self, address: &Address) -> Result<Option<HashHeight>, StoreError> {
        match self.store.get(&key(KP_LATEST_BLOCK, &[address]))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether an undo journal entry exists for the block hash.
    pub fn has_undo(&self, hash: &Hash) -> Result<bool, StoreError> {
        self.store.exists(&key(KP_UNDO, &[hash]))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryKvStore;
    use ledger_types::{AccountBlockBody, StateDelta, ZERO_HASH};

    const ADDR: Address = [1u8; 20];
    const TOKEN: TokenId = [2u8; 32];

    fn vm_block(height: u64, balance: u64) -> VmAccountBlock {
        let mut block = AccountBlock {
            hash: ZERO_HASH,
            prev_hash: ZERO_HASH,
            account_address: ADDR,
            height,
            token_id: TOKEN,
            body: AccountBlockBody::Send {
                to_address: [3u8; 20],
                amount: U256::from(1u64),
            },
        };
        block.hash = block.compute_hash();
        let mut state = StateDelta::default();
        state.balances.insert(TOKEN, U256::from(balance));
        state.storage.insert(b"slot".to_vec(), vec![height as u8]);
        VmAccountBlock { block, state }
    }

    fn open_db() -> StateDb {
        StateDb::open(Box::new(InMemoryKvStore::new())).unwrap()
    }

    #[test]
    fn test_write_materializes_balance_and_latest() {
        let mut db = open_db();
        let vm = vm_block(1, 100);

        db.write(&vm).unwrap();

        assert_eq!(db.get_balance(&ADDR, &TOKEN).unwrap(), Some(U256::from(100u64)));
        assert_eq!(
            db.get_latest_block(&ADDR).unwrap(),
            Some(HashHeight::new(vm.block.hash, 1))
        );
        assert_eq!(db.get_storage(&ADDR, b"slot").unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_delete_restores_previous_state() {
        let mut db = open_db();
        let vm1 = vm_block(1, 100);
        let vm2 = vm_block(2, 40);
        db.write(&vm1).unwrap();
        db.write(&vm2).unwrap();

        db.delete_block(&vm2.block).unwrap();

        assert_eq!(db.get_balance(&ADDR, &TOKEN).unwrap(), Some(U256::from(100u64)));
        assert_eq!(
            db.get_latest_block(&ADDR).unwrap(),
            Some(HashHeight::new(vm1.block.hash, 1))
        );
        assert_eq!(db.get_storage(&ADDR, b"slot").unwrap(), Some(vec![1]));
        assert!(!db.has_undo(&vm2.block.hash).unwrap());
    }

    #[test]
    fn test_delete_first_block_clears_state() {
        let mut db = open_db();
        let vm1 = vm_block(1, 100);
        db.write(&vm1).unwrap();

        db.delete_block(&vm1.block).unwrap();

        assert_eq!(db.get_balance(&ADDR, &TOKEN).unwrap(), None);
        assert_eq!(db.get_latest_block(&ADDR).unwrap(), None);
        assert_eq!(db.get_storage(&ADDR, b"slot").unwrap(), None);
    }

    #[test]
    fn test_commit_snapshot_height() {
        let mut db = open_db();
        assert_eq!(db.committed_snapshot_height().unwrap(), 0);

        let snapshot = SnapshotBlock {
            hash: [9u8; 32],
            prev_hash: ZERO_HASH,
            height: 7,
            timestamp: 0,
            snapshot_content: Default::default(),
        };
        db.commit_snapshot(&snapshot).unwrap();
        assert_eq!(db.committed_snapshot_height().unwrap(), 7);
    }
}
