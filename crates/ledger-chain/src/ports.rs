//! # Outbound Storage Port
//!
//! Abstract key-value interface every chain store is built on, plus the two
//! bundled adapters: an in-memory map for tests and a file-backed map for
//! single-node operation.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(String),

    /// The on-disk representation could not be decoded.
    #[error("corrupted store: {0}")]
    Corrupted(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for ledger_types::ChainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupted(message) => ledger_types::ChainError::Corrupted(message),
            other => ledger_types::ChainError::Store(other.to_string()),
        }
    }
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Abstract interface for key-value database operations.
///
/// Writes become durable only at `flush`; the flusher invokes it once per
/// insertion, before the post-insert event fires.
pub trait KeyValueStore: Send {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Execute an atomic batch write: either every operation applies or
    /// none do.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Iterate over keys with a prefix.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Make all prior writes durable.
    fn flush(&mut self) -> Result<(), StoreError>;
}

/// In-memory key-value store for unit tests and ephemeral chains.
#[derive(Default)]
pub struct InMemoryKvStore {
    data: std::collections::HashMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let results: Vec<_> = self
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// File-backed key-value store.
///
/// Keeps the full map in memory; `flush` persists it atomically via a
/// temp-file rename. Binary format: repeated
/// `[key_len: u32 LE][key][value_len: u32 LE][value]` records.
#[derive(Debug)]
pub struct FileKvStore {
    data: std::collections::HashMap<Vec<u8>, Vec<u8>>,
    path: std::path::PathBuf,
    dirty: bool,
}

impl FileKvStore {
    /// Open the store file, loading any existing content.
    ///
    /// A file that cannot be parsed to the end is reported as
    /// [`StoreError::Corrupted`]; callers decide whether to wipe or abort.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => Self::parse(&bytes)
                .ok_or_else(|| StoreError::Corrupted(format!("{}", path.display())))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Default::default(),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
        if !data.is_empty() {
            tracing::debug!(path = %path.display(), keys = data.len(), "loaded store file");
        }
        Ok(Self {
            data,
            path,
            dirty: false,
        })
    }

    fn parse(bytes: &[u8]) -> Option<std::collections::HashMap<Vec<u8>, Vec<u8>>> {
        let mut data = std::collections::HashMap::new();
        let mut cursor = 0usize;

        while cursor < bytes.len() {
            let key = Self::take_field(bytes, &mut cursor)?;
            let value = Self::take_field(bytes, &mut cursor)?;
            data.insert(key, value);
        }
        Some(data)
    }

    fn take_field(bytes: &[u8], cursor: &mut usize) -> Option<Vec<u8>> {
        let len_end = cursor.checked_add(4)?;
        let len = u32::from_le_bytes(bytes.get(*cursor..len_end)?.try_into().ok()?) as usize;
        let field_end = len_end.checked_add(len)?;
        let field = bytes.get(len_end..field_end)?.to_vec();
        *cursor = field_end;
        Some(field)
    }

    fn save(&self) -> Result<(), StoreError> {
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let mut bytes = Vec::new();
        for (key, value) in &self.data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file =
            std::fs::File::create(&temp_path).map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&bytes)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.sync_all().map_err(|e| StoreError::Io(e.to_string()))?;

        std::fs::rename(&temp_path, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.data.remove(key);
        self.dirty = true;
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let results: Vec<_> = self
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.save()?;
            self.dirty = false;
        }
        Ok(())
    }
}
