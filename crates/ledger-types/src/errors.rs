//! # Shared Error Types
//!
//! Errors surfaced by implementations of the chain read contract.

use crate::entities::{Address, Hash};
use thiserror::Error;

/// Errors a chain reader can return.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// A value could not be decoded from the backing store.
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// The address has never been registered on this chain.
    #[error("account not found: {}", hex::encode(address))]
    AccountNotFound { address: Address },

    /// A block a caller asserted to exist is unknown.
    #[error("block not found: {}", hex::encode(hash))]
    BlockNotFound { hash: Hash },

    /// A receive block references a send block the chain does not have.
    #[error("send block not found: {}", hex::encode(from_block_hash))]
    SendBlockNotFound { from_block_hash: Hash },
}

impl ChainError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}
