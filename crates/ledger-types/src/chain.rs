//! # Chain Read Contract
//!
//! The read-only view of the ledger that index builders consume. The chain
//! crate implements it over its real stores; tests implement it with
//! in-memory mocks.

use crate::entities::{Account, AccountBlock, Address, BlockEvent, Hash};
use crate::errors::ChainError;

/// Read access to the canonical chain and its event log.
///
/// The event log is append-only with dense ids; consumers tail it by id and
/// must tolerate blocks that have already been rolled back (a later
/// `Delete` event will follow).
pub trait Chain: Send + Sync {
    /// Highest event id on the log, 0 if the log is empty.
    fn latest_block_event_id(&self) -> Result<u64, ChainError>;

    /// Fetch one event by id. `None` for ids beyond the log head.
    fn get_event(&self, event_id: u64) -> Result<Option<BlockEvent>, ChainError>;

    /// Fetch an account block by hash. `None` if unknown to the canonical
    /// chain.
    fn get_account_block_by_hash(&self, hash: &Hash) -> Result<Option<AccountBlock>, ChainError>;

    /// Resolve an address to its registered account.
    fn get_account(&self, address: &Address) -> Result<Account, ChainError>;

    /// Whether the hash names a block on the current canonical chain.
    fn is_account_block_existed(&self, hash: &Hash) -> Result<bool, ChainError>;

    /// Whether the block is the genesis block of its account chain.
    fn is_genesis_account_block(&self, block: &AccountBlock) -> bool;
}
