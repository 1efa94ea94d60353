//! Pool configuration.

use std::time::Duration;

/// Default worker pulse.
pub const DEFAULT_WORKER_INTERVAL: Duration = Duration::from_millis(200);

/// Default fork-check pulse.
pub const DEFAULT_FORK_CHECK_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name used in logs.
    pub name: String,
    /// Worker loop cadence: snippet assembly, appending, fetching,
    /// insertion.
    pub worker_interval: Duration,
    /// Fork-check loop cadence.
    pub fork_check_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "snapshot".to_string(),
            worker_interval: DEFAULT_WORKER_INTERVAL,
            fork_check_interval: DEFAULT_FORK_CHECK_INTERVAL,
        }
    }
}
