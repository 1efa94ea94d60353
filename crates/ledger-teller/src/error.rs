//! Teller errors.

use ledger_types::ChainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TellerError {
    /// The election anchor is above the current head: a rollback happened
    /// between choosing the anchor and reading it.
    #[error("rollback happened, block height [{block_height}], head height [{head_height}]")]
    Rollback { block_height: u64, head_height: u64 },

    /// No snapshot block exists before the requested time.
    #[error("no snapshot before time {timestamp}")]
    NoSnapshotBeforeTime { timestamp: u64 },

    /// The chain reader failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}
