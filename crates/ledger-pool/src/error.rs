//! Pool errors.

use ledger_types::ChainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The fork switch could not locate the first divergent block on the
    /// longest chain.
    #[error("key point is missing, forked height {forked_height}")]
    KeyPointMissing { forked_height: u64 },

    /// The fork switch found no block shared between the longest and
    /// current chains.
    #[error("no common ancestor between longest and current chains")]
    ForkPointMissing,

    /// A direct insertion's verification did not succeed.
    #[error("verify failed: {0}")]
    VerifyFailed(String),

    /// A direct insertion is waiting on data that is not yet available.
    #[error("pending for {0}")]
    Pending(String),

    /// The disk chain rejected an operation.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The insertion pipeline rejected a write-through.
    #[error("insert failed: {0}")]
    Insert(String),

    /// The account sub-pool failed to fork or pend an account.
    #[error("account pool: {0}")]
    AccountPool(String),
}

impl From<ledger_chain::InsertError> for PoolError {
    fn from(err: ledger_chain::InsertError) -> Self {
        Self::Insert(err.to_string())
    }
}
