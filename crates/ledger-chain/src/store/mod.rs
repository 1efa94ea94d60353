//! # Chain Stores
//!
//! The three persistence leaves: the append-only block store, the index DB
//! and the state DB. Each one owns a [`crate::ports::KeyValueStore`] and a
//! single-byte key-prefix namespace inside it.

pub mod block_db;
pub mod index_db;
pub mod state_db;

pub use block_db::{BlockDb, Location};
pub use index_db::IndexDb;
pub use state_db::StateDb;

/// Build a store key: prefix byte followed by fixed-width field bytes.
pub(crate) fn key(prefix: u8, fields: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + fields.iter().map(|f| f.len()).sum::<usize>());
    out.push(prefix);
    for field in fields {
        out.extend_from_slice(field);
    }
    out
}
