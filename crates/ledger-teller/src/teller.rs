//! # Teller
//!
//! Computes the election for any period index. Results are cached by
//! snapshot hash alone: the computation is deterministic in the snapshot,
//! so one hash can only ever map to one address list.

use crate::algo::{convert_votes_to_addresses, ElectionAlgo, VoteAlgoContext};
use crate::error::TellerError;
use crate::group::{GroupInfo, MemberPlan};
use crate::ports::ConsensusReader;
use ledger_types::{Address, Hash, HashHeight, SnapshotBlock};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

const VOTE_CACHE_SIZE: usize = 1024;

/// The outcome of one election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionResult {
    pub index: u64,
    pub s_time: u64,
    pub e_time: u64,
    /// Snapshot block the election is anchored to.
    pub hash: Hash,
    pub height: u64,
    pub plans: Vec<MemberPlan>,
}

/// Deterministic election computation for one producer group.
pub struct Teller {
    info: GroupInfo,
    algo: ElectionAlgo,
    reader: Arc<dyn ConsensusReader>,
    vote_cache: Mutex<LruCache<Hash, Arc<Vec<Address>>>>,
}

impl Teller {
    #[must_use]
    pub fn new(info: GroupInfo, reader: Arc<dyn ConsensusReader>) -> Self {
        let algo = ElectionAlgo::new(info.clone());
        Self {
            info,
            algo,
            reader,
            vote_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(VOTE_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        }
    }

    /// Compute the election for period `index`.
    pub fn election_index(&self, index: u64) -> Result<ElectionResult, TellerError> {
        let vote_time = self.info.gen_vote_time(index);
        let vote_index = self.info.time_to_index(vote_time).saturating_sub(1);

        let block = self.reader.snapshot_block_before_time(vote_time)?;
        debug!(
            index,
            vote_time,
            anchor = %ledger_types::short_hash(&block.hash),
            "election"
        );
        let seed = self.reader.seed_before(&block, self.info.seed_duration)?;

        let addresses = self.vote_results(&block, seed, vote_index)?;
        Ok(self.gen_plan(index, &addresses, &block))
    }

    /// Compute the election for the period containing `timestamp`.
    pub fn election_time(&self, timestamp: u64) -> Result<ElectionResult, TellerError> {
        self.election_index(self.info.time_to_index(timestamp))
    }

    #[must_use]
    pub fn time_to_index(&self, timestamp: u64) -> u64 {
        self.info.time_to_index(timestamp)
    }

    #[must_use]
    pub fn index_to_time(&self, index: u64) -> (u64, u64) {
        (self.info.gen_s_time(index), self.info.gen_e_time(index))
    }

    fn vote_results(
        &self,
        block: &SnapshotBlock,
        seed: u64,
        vote_index: u64,
    ) -> Result<Arc<Vec<Address>>, TellerError> {
        let head = self.reader.latest_snapshot_block()?;
        if block.height > head.height {
            return Err(TellerError::Rollback {
                block_height: block.height,
                head_height: head.height,
            });
        }
        self.cal_votes(HashHeight::new(block.hash, block.height), seed, vote_index)
    }

    fn cal_votes(
        &self,
        hash_height: HashHeight,
        seed: u64,
        vote_index: u64,
    ) -> Result<Arc<Vec<Address>>, TellerError> {
        if let Some(cached) = self.vote_cache.lock().get(&hash_height.hash) {
            debug!(vote_index, anchor = %hash_height, "vote cache hit");
            return Ok(Arc::clone(cached));
        }

        let votes = self.reader.votes_at(&hash_height)?;
        let success_rate = self.reader.success_rate_by_hour(vote_index)?;

        let context = VoteAlgoContext {
            votes,
            hash_height: &hash_height,
            success_rate: &success_rate,
            seed,
        };
        let filtered = self.algo.filter_votes(context);
        let shuffled = self.algo.shuffle_votes(filtered, &hash_height, seed);
        let addresses = Arc::new(convert_votes_to_addresses(shuffled));

        self.vote_cache
            .lock()
            .put(hash_height.hash, Arc::clone(&addresses));
        Ok(addresses)
    }

    fn gen_plan(&self, index: u64, members: &[Address], block: &SnapshotBlock) -> ElectionResult {
        ElectionResult {
            index,
            s_time: self.info.gen_s_time(index),
            e_time: self.info.gen_e_time(index),
            hash: block.hash,
            height: block.height,
            plans: self.info.gen_plan_by_address(index, members),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::Vote;
    use crate::ports::SuccessRateMap;
    use ledger_types::{SnapshotContent, U256};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reader over a fixed anchor snapshot and vote table, counting vote
    /// scans.
    struct FixedReader {
        anchor: SnapshotBlock,
        head: SnapshotBlock,
        votes: Vec<Vote>,
        seed: u64,
        vote_scans: AtomicUsize,
    }

    impl FixedReader {
        fn new(votes: Vec<Vote>, seed: u64) -> Self {
            let mut anchor = SnapshotBlock {
                hash: [0u8; 32],
                prev_hash: [0u8; 32],
                height: 50,
                timestamp: 900,
                snapshot_content: SnapshotContent::new(),
            };
            anchor.hash = anchor.compute_hash();
            Self {
                head: anchor.clone(),
                anchor,
                votes,
                seed,
                vote_scans: AtomicUsize::new(0),
            }
        }
    }

    impl ConsensusReader for FixedReader {
        fn latest_snapshot_block(&self) -> Result<SnapshotBlock, TellerError> {
            Ok(self.head.clone())
        }

        fn snapshot_block_before_time(&self, _timestamp: u64) -> Result<SnapshotBlock, TellerError> {
            Ok(self.anchor.clone())
        }

        fn seed_before(
            &self,
            _block: &SnapshotBlock,
            _seed_duration: u64,
        ) -> Result<u64, TellerError> {
            Ok(self.seed)
        }

        fn votes_at(&self, _hash_height: &HashHeight) -> Result<Vec<Vote>, TellerError> {
            self.vote_scans.fetch_add(1, Ordering::SeqCst);
            Ok(self.votes.clone())
        }

        fn success_rate_by_hour(&self, _vote_index: u64) -> Result<SuccessRateMap, TellerError> {
            Ok(SuccessRateMap::new())
        }
    }

    fn votes() -> Vec<Vote> {
        (1..=10u8)
            .map(|tag| Vote {
                address: [tag; 20],
                balance: U256::from(100 * u64::from(tag)),
            })
            .collect()
    }

    fn info() -> GroupInfo {
        // 4 members, 1s slots, 3 slots each: 12s periods, genesis at 1000.
        GroupInfo::new(1000, 4, 1, 3)
    }

    #[test]
    fn test_identical_inputs_give_identical_elections() {
        let a = Teller::new(info(), Arc::new(FixedReader::new(votes(), 99)));
        let b = Teller::new(info(), Arc::new(FixedReader::new(votes(), 99)));

        let result_a = a.election_index(5).unwrap();
        let result_b = b.election_index(5).unwrap();
        assert_eq!(result_a, result_b);
        assert_eq!(result_a.plans.len(), 12);
        assert_eq!(result_a.s_time, 1060);
        assert_eq!(result_a.e_time, 1072);
        assert_eq!(result_a.height, 50);
    }

    #[test]
    fn test_different_seed_changes_order() {
        let a = Teller::new(info(), Arc::new(FixedReader::new(votes(), 1)));
        let b = Teller::new(info(), Arc::new(FixedReader::new(votes(), 2)));

        let order_a: Vec<_> = a.election_index(5).unwrap().plans;
        let order_b: Vec<_> = b.election_index(5).unwrap().plans;
        assert_ne!(order_a, order_b);
    }

    #[test]
    fn test_vote_cache_keyed_by_snapshot_hash() {
        let reader = Arc::new(FixedReader::new(votes(), 99));
        let teller = Teller::new(info(), Arc::clone(&reader) as Arc<dyn ConsensusReader>);

        let first = teller.election_index(3).unwrap();
        // Same anchor: different indexes, but one vote scan only.
        let second = teller.election_index(4).unwrap();

        assert_eq!(reader.vote_scans.load(Ordering::SeqCst), 1);
        assert_eq!(first.hash, second.hash);
        // The member order is shared; the plan times differ per period.
        assert_ne!(first.s_time, second.s_time);
    }

    #[test]
    fn test_rollback_anchor_is_rejected() {
        let mut reader = FixedReader::new(votes(), 99);
        // The head rolled back below the anchor after it was chosen.
        reader.head.height = 10;

        let teller = Teller::new(info(), Arc::new(reader));
        match teller.election_index(1) {
            Err(TellerError::Rollback {
                block_height,
                head_height,
            }) => {
                assert_eq!(block_height, 50);
                assert_eq!(head_height, 10);
            }
            other => panic!("expected rollback error, got {other:?}"),
        }
    }

    #[test]
    fn test_election_time_maps_to_period() {
        let teller = Teller::new(info(), Arc::new(FixedReader::new(votes(), 99)));
        let result = teller.election_time(1025).unwrap();
        assert_eq!(result.index, 2);
        assert_eq!(teller.index_to_time(2), (1024, 1036));
    }
}
