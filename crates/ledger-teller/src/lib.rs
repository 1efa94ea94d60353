//! # Ledger Teller
//!
//! Deterministic election of a producer set from votes anchored to a
//! snapshot block. Every node computing an election for the same
//! `(snapshot hash, group configuration, seed, success rates)` must arrive
//! at the byte-identical producer order, so the whole path is integer
//! arithmetic and Keccak-derived randomness: no floats, no ambient
//! entropy.

pub mod algo;
pub mod error;
pub mod group;
pub mod ports;
pub mod teller;

pub use algo::{DetRng, ElectionAlgo, Vote, VoteAlgoContext};
pub use error::TellerError;
pub use group::{GroupInfo, MemberPlan};
pub use ports::{ConsensusReader, SuccessRateMap};
pub use teller::{ElectionResult, Teller};
