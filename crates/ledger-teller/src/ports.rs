//! # Consensus Read Contract
//!
//! What the teller needs from the chain: snapshot anchors, the aggregated
//! seed, the delegation state and the producer success-rate statistics.

use crate::algo::Vote;
use crate::error::TellerError;
use ledger_types::{Address, HashHeight, SnapshotBlock};
use std::collections::BTreeMap;

/// Hourly production success rate per producer, in permille. Missing
/// entries count as full rate.
pub type SuccessRateMap = BTreeMap<Address, u32>;

/// Read access to the finalized snapshot state the teller elects over.
pub trait ConsensusReader: Send + Sync {
    /// Head of the canonical snapshot chain.
    fn latest_snapshot_block(&self) -> Result<SnapshotBlock, TellerError>;

    /// Newest snapshot block strictly before `timestamp`.
    fn snapshot_block_before_time(&self, timestamp: u64) -> Result<SnapshotBlock, TellerError>;

    /// Seed aggregated over the `seed_duration` seconds of snapshots
    /// preceding `block`.
    fn seed_before(&self, block: &SnapshotBlock, seed_duration: u64) -> Result<u64, TellerError>;

    /// Delegation votes anchored at a snapshot.
    fn votes_at(&self, hash_height: &HashHeight) -> Result<Vec<Vote>, TellerError>;

    /// Producer success rates for a vote index.
    fn success_rate_by_hour(&self, vote_index: u64) -> Result<SuccessRateMap, TellerError>;
}
