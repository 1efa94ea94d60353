//! # Index Store Factory
//!
//! The index is derived state, so its store must support being wiped and
//! recreated. The factory abstracts that: `open` hands out a live store,
//! `wipe` destroys the persisted state so the next `open` starts empty.
//!
//! Opening distinguishes corruption (recoverable: wipe and rebuild) from
//! other I/O failures (propagated to the caller).

use ledger_chain::{BatchOperation, FileKvStore, KeyValueStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Opens and destroys the index's backing store.
pub trait IndexStoreFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn KeyValueStore>, StoreError>;

    fn wipe(&self) -> Result<(), StoreError>;
}

/// Directory-backed factory: the store is a single file inside the index
/// directory; `wipe` removes the whole directory.
pub struct DirStoreFactory {
    dir: PathBuf,
}

impl DirStoreFactory {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.join("index.db")
    }
}

impl IndexStoreFactory for DirStoreFactory {
    fn open(&self) -> Result<Box<dyn KeyValueStore>, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Box::new(FileKvStore::open(self.db_path())?))
    }

    fn wipe(&self) -> Result<(), StoreError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err.to_string())),
        }
    }
}

/// In-memory factory whose backing map survives `open` calls, for tests
/// that exercise restart and wipe behavior without a filesystem.
#[derive(Clone, Default)]
pub struct SharedMemStoreFactory {
    data: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl SharedMemStoreFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently persisted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl IndexStoreFactory for SharedMemStoreFactory {
    fn open(&self) -> Result<Box<dyn KeyValueStore>, StoreError> {
        Ok(Box::new(SharedMemStore {
            data: Arc::clone(&self.data),
        }))
    }

    fn wipe(&self) -> Result<(), StoreError> {
        self.data.lock().clear();
        Ok(())
    }
}

struct SharedMemStore {
    data: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl KeyValueStore for SharedMemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.data.lock().remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .data
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_mem_factory_survives_reopen() {
        let factory = SharedMemStoreFactory::new();
        {
            let mut store = factory.open().unwrap();
            store.put(b"k", b"v").unwrap();
        }
        let store = factory.open().unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));

        factory.wipe().unwrap();
        let store = factory.open().unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_dir_factory_wipe_recreates_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let factory = DirStoreFactory::new(dir.path().join("ledger_index"));

        {
            let mut store = factory.open().unwrap();
            store.put(b"k", b"v").unwrap();
            store.flush().unwrap();
        }
        factory.wipe().unwrap();
        let store = factory.open().unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }
}
