//! # Election Algorithm
//!
//! Vote filtering and shuffling. Everything here must be reproducible from
//! the inputs alone: weights are integer arithmetic on `U256`, randomness
//! is a Keccak counter stream keyed by `(seed, snapshot hash, height)`,
//! and all iteration orders are explicit.

use crate::group::GroupInfo;
use crate::ports::SuccessRateMap;
use ledger_types::{Address, HashHeight, U256};
use sha3::{Digest, Keccak256};

/// Success rates are expressed in permille; a missing entry counts as
/// full rate.
pub const FULL_RATE_PERMILLE: u32 = 1000;

/// One delegation vote: the candidate and the balance backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub address: Address,
    pub balance: U256,
}

/// Inputs to one filter pass.
pub struct VoteAlgoContext<'a> {
    pub votes: Vec<Vote>,
    pub hash_height: &'a HashHeight,
    pub success_rate: &'a SuccessRateMap,
    pub seed: u64,
}

/// Deterministic random stream: repeated Keccak over an evolving state.
pub struct DetRng {
    state: [u8; 32],
}

impl DetRng {
    #[must_use]
    pub fn new(seed: u64, hash_height: &HashHeight) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(seed.to_be_bytes());
        hasher.update(hash_height.hash);
        hasher.update(hash_height.height.to_be_bytes());
        Self {
            state: hasher.finalize().into(),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = Keccak256::digest(self.state).into();
        u64::from_be_bytes(self.state[..8].try_into().expect("state is 32 bytes"))
    }
}

/// The election algorithm for one group.
pub struct ElectionAlgo {
    info: GroupInfo,
}

impl ElectionAlgo {
    #[must_use]
    pub fn new(info: GroupInfo) -> Self {
        Self { info }
    }

    /// Select `member_count` votes: the top weights by balance adjusted
    /// with the producer success rate, plus `rand_count` seed-picked from
    /// the remainder.
    #[must_use]
    pub fn filter_votes(&self, context: VoteAlgoContext<'_>) -> Vec<Vote> {
        let VoteAlgoContext {
            votes,
            hash_height,
            success_rate,
            seed,
        } = context;

        let mut weighted: Vec<(U256, Vote)> = votes
            .into_iter()
            .map(|vote| (adjusted_weight(&vote, success_rate), vote))
            .collect();
        // Highest weight first; addresses break ties so the order never
        // depends on input order.
        weighted.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.address.cmp(&b.1.address)));

        let total = self.info.member_count as usize;
        if weighted.len() <= total {
            return weighted.into_iter().map(|(_, vote)| vote).collect();
        }

        let rand_count = (self.info.rand_count as usize).min(total);
        let top_count = total - rand_count;

        let mut rest = weighted.split_off(top_count);
        let mut selected: Vec<Vote> = weighted.into_iter().map(|(_, vote)| vote).collect();

        let mut rng = DetRng::new(seed, hash_height);
        for _ in 0..rand_count {
            let pick = (rng.next_u64() as usize) % rest.len();
            selected.push(rest.remove(pick).1);
        }
        selected
    }

    /// Deterministic permutation of the selected votes.
    #[must_use]
    pub fn shuffle_votes(
        &self,
        mut votes: Vec<Vote>,
        hash_height: &HashHeight,
        seed: u64,
    ) -> Vec<Vote> {
        let mut rng = DetRng::new(seed.wrapping_add(1), hash_height);
        for i in (1..votes.len()).rev() {
            let j = (rng.next_u64() as usize) % (i + 1);
            votes.swap(i, j);
        }
        votes
    }
}

fn adjusted_weight(vote: &Vote, success_rate: &SuccessRateMap) -> U256 {
    let permille = success_rate
        .get(&vote.address)
        .copied()
        .unwrap_or(FULL_RATE_PERMILLE)
        .min(FULL_RATE_PERMILLE);
    vote.balance * U256::from(permille) / U256::from(FULL_RATE_PERMILLE)
}

/// Drop the balances, keeping the elected order.
#[must_use]
pub fn convert_votes_to_addresses(votes: Vec<Vote>) -> Vec<Address> {
    votes.into_iter().map(|vote| vote.address).collect()
}
