//! # Ledger Token Index
//!
//! A background service materializing, per `(account, token)`, the hash of
//! the newest account block involving that token. Each indexed block keeps
//! a back-pointer to the previous block-of-same-token on the same account,
//! so the index is a set of per-token linked lists threaded through block
//! hashes.
//!
//! The index is derived state: it is rebuilt by tailing the chain's block
//! event log and may be wiped and reconstructed from scratch at any time.
//! On startup, a persisted consume-id beyond the chain's latest event id
//! means the chain was rolled back underneath us; the index directory is
//! recreated empty and the build restarts from event 1.
//!
//! ## Persisted layout
//!
//! Keys are a single prefix byte followed by length-prefixed big-endian
//! fields (see [`keys`]):
//!
//! | Prefix | Key | Value |
//! |---|---|---|
//! | 1 | block hash | previous block hash in same token (empty = none) |
//! | 2 | account id ‖ token id | head block hash |
//! | 3 | (none) | build progress checkpoint (event id) |
//! | 4 | head block hash | account id ‖ token id |

pub mod builder;
pub mod config;
pub mod error;
pub mod keys;
pub mod store;

pub use builder::TokenHeadIndex;
pub use config::TokenIndexConfig;
pub use error::IndexError;
pub use store::{DirStoreFactory, IndexStoreFactory, SharedMemStoreFactory};
