//! # Snapshot Verification Contract
//!
//! A verdict is data, not an error: the pool routes each outcome to a
//! different recovery path.

use ledger_types::{Address, SnapshotBlock};
use std::collections::BTreeMap;

/// Outcome of verifying one snapshot block (or one pinned account within
/// it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    /// The block may be written to the disk chain.
    Success,
    /// Some referenced account blocks are not yet available.
    Pending,
    /// The snapshot contradicts the local account chains.
    Fail,
}

/// Full verification result: the overall verdict plus the per-pinned-
/// account verdicts the fail/pending handlers act on.
#[derive(Debug, Clone)]
pub struct SnapshotVerifyStat {
    pub result: VerifyResult,
    /// Verdict per address in the snapshot's content.
    pub results: BTreeMap<Address, VerifyResult>,
    /// Human-readable detail for `Fail` verdicts.
    pub err_msg: Option<String>,
}

impl SnapshotVerifyStat {
    /// An all-success stat with no per-account detail.
    #[must_use]
    pub fn success() -> Self {
        Self {
            result: VerifyResult::Success,
            results: BTreeMap::new(),
            err_msg: None,
        }
    }

    #[must_use]
    pub fn error_message(&self) -> String {
        self.err_msg.clone().unwrap_or_default()
    }
}

/// Verifies candidate snapshot blocks against the local account chains.
pub trait SnapshotVerifier: Send + Sync {
    fn verify_snapshot(&self, block: &SnapshotBlock) -> SnapshotVerifyStat;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_stat() {
        let stat = SnapshotVerifyStat::success();
        assert_eq!(stat.result, VerifyResult::Success);
        assert!(stat.results.is_empty());
        assert_eq!(stat.error_message(), "");
    }
}
