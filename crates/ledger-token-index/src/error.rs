//! Token-index errors.

use ledger_types::{ChainError, Hash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The backing key-value store failed.
    #[error(transparent)]
    Store(#[from] ledger_chain::StoreError),

    /// The chain read contract failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The event log reported a gap where dense ids were expected.
    #[error("event log gap at id {event_id}")]
    EventGap { event_id: u64 },

    /// A walk origin the caller supplied is not indexed.
    #[error("block {} is not indexed", hex::encode(hash))]
    MissingOrigin { hash: Hash },

    /// A receive block references a send block the chain cannot produce.
    #[error("send block {} is missing", hex::encode(from_block_hash))]
    SendBlockMissing { from_block_hash: Hash },

    /// A persisted value had an unexpected shape.
    #[error("corrupted index entry: {0}")]
    Corrupted(String),
}
