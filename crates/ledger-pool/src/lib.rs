//! # Ledger Pool
//!
//! The snapshot pool buffers candidate snapshot blocks as a set of forked
//! chains sharing a common tail with the canonical disk chain, and drives
//! them toward insertion:
//!
//! - a **worker loop** (200 ms pulse) links newly arrived blocks into
//!   snippet chains, attaches them to existing forks, requests missing
//!   predecessors, and walks the current chain through verification into
//!   the disk chain;
//! - a **fork-check loop** (2 s pulse) switches the current chain when a
//!   longer valid fork exists, rolling the disk chain back to the deepest
//!   shared ancestor first.
//!
//! Verification verdicts are data, not errors: `FAIL` forks the pinned
//! accounts, `PENDING` requests the missing account blocks, and both bump
//! the pool's fork version so stale cached verdicts are retried.

pub mod adapters;
pub mod chain_pool;
pub mod config;
pub mod error;
pub mod forked_chain;
pub mod ports;
pub mod snapshot_pool;
pub mod verifier;

pub use chain_pool::ChainPool;
pub use config::PoolConfig;
pub use error::PoolError;
pub use forked_chain::{ForkedChain, SnapshotPoolBlock};
pub use ports::{AccountPoolOps, BlockPoolNotifier, DiskChain, SnapshotFetcher};
pub use snapshot_pool::SnapshotPool;
pub use verifier::{SnapshotVerifier, SnapshotVerifyStat, VerifyResult};
