//! # Ledger Types
//!
//! Shared domain entities for the DAG-ledger core.
//!
//! Every subsystem crate (chain, token index, snapshot pool, teller) builds
//! on the types defined here, so cross-crate contracts never duplicate
//! entity definitions.
//!
//! ## Clusters
//!
//! - **Account chains**: [`AccountBlock`], [`VmAccountBlock`], [`StateDelta`]
//! - **Snapshot chain**: [`SnapshotBlock`], [`SnapshotChunk`], [`HashHeight`]
//! - **Event log**: [`BlockEvent`], [`EventKind`]
//! - **Chain contract**: the [`chain::Chain`] read trait consumed by index
//!   builders

pub mod chain;
pub mod entities;
pub mod errors;

pub use chain::Chain;
pub use entities::*;
pub use errors::ChainError;
