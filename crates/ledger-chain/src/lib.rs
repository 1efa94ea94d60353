//! # Ledger Chain
//!
//! Primary persistence for the DAG-ledger core and the synchronous
//! insertion pipeline over it.
//!
//! ## Stores, leaves first
//!
//! - **Block store** ([`store::BlockDb`]): append-only chunk log; persists a
//!   snapshot block together with the account blocks it confirms and hands
//!   back a physical [`store::Location`] per block.
//! - **Index DB** ([`store::IndexDb`]): hashes and heights to locations, the
//!   account registry, and the append-only block event log.
//! - **State DB** ([`store::StateDb`]): materialized balances and storage
//!   with an undo journal per block.
//! - **Cache** ([`cache::ChainCache`]): unconfirmed account blocks and the
//!   latest snapshot pointer; written only by the insertion pipeline.
//! - **Snapshot chain head** ([`snapshot_chain::SnapshotChain`]): the
//!   canonical snapshot chain with genesis bootstrap.
//!
//! ## Insertion pipeline
//!
//! [`Chain::insert_account_block`] and [`Chain::insert_snapshot_block`]
//! write to all stores between a prepare and a post event on the ledger
//! bus. A write that leaves the stores disagreeing is unrecoverable without
//! a restart: it is logged and the process aborts.
//!
//! The caller serializes insertions; per-store locks only protect readers
//! running concurrently with an insert.

pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod flusher;
pub mod genesis;
pub mod ports;
pub mod snapshot_chain;
pub mod store;

mod fatal;

pub use chain::Chain;
pub use config::ChainConfig;
pub use error::InsertError;
pub use genesis::{
    genesis_snapshot_block, GENESIS_ACCOUNT_BLOCK_HASHES, GENESIS_HASH, GENESIS_HEIGHT,
    GENESIS_TIMESTAMP,
};
pub use ports::{BatchOperation, FileKvStore, InMemoryKvStore, KeyValueStore, StoreError};
pub use store::Location;
