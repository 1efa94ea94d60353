//! Token-index configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default number of events to process before persisting progress.
pub const DEFAULT_EVENT_NUM_PER_BATCH: u64 = 1000;

/// Default background build cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(3);

/// Name of the index directory below the node data directory.
pub const INDEX_DIR_NAME: &str = "ledger_index";

#[derive(Debug, Clone)]
pub struct TokenIndexConfig {
    /// Node data directory; the index lives in `<data_dir>/ledger_index`.
    pub data_dir: PathBuf,
    /// Events per batch between consume-id checkpoints.
    pub event_num_per_batch: u64,
    /// Background build cadence.
    pub tick_interval: Duration,
}

impl TokenIndexConfig {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            event_num_per_batch: DEFAULT_EVENT_NUM_PER_BATCH,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Directory the index store lives in.
    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join(INDEX_DIR_NAME)
    }
}
