//! Chain configuration.

use std::path::PathBuf;

/// Configuration for an on-disk chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Root data directory; each store lives in its own file below it.
    pub data_dir: PathBuf,
}

impl ChainConfig {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub(crate) fn store_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}
