//! # Snapshot Pool
//!
//! Drives the forked-chain set toward insertion. Two cooperative loops run
//! until the shared close channel fires:
//!
//! - worker loop (200 ms): gen snippets → append chains → fetch gaps →
//!   try current-chain insert → prune;
//! - fork-check loop (2 s): switch current when a longer valid fork
//!   exists.
//!
//! Locks: `pool_lock` is the pool-wide reader-writer lock covering
//! cross-chain invariants (read for insertion, write for the fork switch
//! and account forking); `r_mu` serializes the insertion walk; the chain
//! state itself lives in its own `RwLock` acquired after both.

use crate::chain_pool::ChainPool;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::forked_chain::{ForkedChain, SnapshotPoolBlock};
use crate::ports::{AccountPoolOps, BlockPoolNotifier, DiskChain, SnapshotFetcher};
use crate::verifier::{SnapshotVerifier, SnapshotVerifyStat, VerifyResult};
use ledger_types::{Address, HashHeight, SnapshotBlock};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct LoopHandles {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

/// The snapshot pool.
pub struct SnapshotPool {
    config: PoolConfig,

    state: RwLock<ChainPool>,
    /// Pool-wide lock: read-held during insertion, write-held across the
    /// fork switch and account forking.
    pool_lock: Arc<RwLock<()>>,
    /// Serializes the insertion walk.
    r_mu: Mutex<()>,
    /// Monotonic fork version; bumping it invalidates cached verdicts.
    version: AtomicU64,

    disk: Arc<dyn DiskChain>,
    verifier: Arc<dyn SnapshotVerifier>,
    fetcher: Arc<dyn SnapshotFetcher>,
    account_pool: Arc<dyn AccountPoolOps>,
    block_pool: Arc<dyn BlockPoolNotifier>,

    lifecycle: Mutex<Option<LoopHandles>>,
}

impl SnapshotPool {
    pub fn new(
        config: PoolConfig,
        disk: Arc<dyn DiskChain>,
        verifier: Arc<dyn SnapshotVerifier>,
        fetcher: Arc<dyn SnapshotFetcher>,
        account_pool: Arc<dyn AccountPoolOps>,
        block_pool: Arc<dyn BlockPoolNotifier>,
    ) -> Arc<Self> {
        let state = ChainPool::new(disk.head());
        Arc::new(Self {
            config,
            state: RwLock::new(state),
            pool_lock: Arc::new(RwLock::new(())),
            r_mu: Mutex::new(()),
            version: AtomicU64::new(0),
            disk,
            verifier,
            fetcher,
            account_pool,
            block_pool,
            lifecycle: Mutex::new(None),
        })
    }

    /// The pool-wide lock, shared with the account sub-pools by the
    /// composite pool that owns both.
    #[must_use]
    pub fn pool_lock(&self) -> Arc<RwLock<()>> {
        Arc::clone(&self.pool_lock)
    }

    /// Current fork version.
    #[must_use]
    pub fn fork_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Hand a candidate snapshot block to the pool.
    pub fn add_block(&self, block: SnapshotBlock) {
        let version = self.fork_version();
        self.state
            .write()
            .add_free_block(SnapshotPoolBlock::new(block, version));
    }

    // =========================================================================
    // LOOPS
    // =========================================================================

    /// Spawn the worker and fork-check loops. Re-entrant starts are
    /// no-ops.
    pub fn start(self: &Arc<Self>) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = {
            let pool = Arc::clone(self);
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(pool.config.worker_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => pool.work_once(),
                        _ = shutdown.changed() => return,
                    }
                }
            })
        };

        let fork_checker = {
            let pool = Arc::clone(self);
            let mut shutdown = shutdown_rx;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(pool.config.fork_check_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => pool.check_fork(),
                        _ = shutdown.changed() => return,
                    }
                }
            })
        };

        *lifecycle = Some(LoopHandles {
            shutdown: shutdown_tx,
            workers: vec![worker, fork_checker],
        });
        info!(pool = %self.config.name, "snapshot pool started");
    }

    /// Close the shared channel and join both loops.
    pub async fn stop(&self) {
        let handles = self.lifecycle.lock().take();
        if let Some(handles) = handles {
            let _ = handles.shutdown.send(true);
            for worker in handles.workers {
                let _ = worker.await;
            }
            info!(pool = %self.config.name, "snapshot pool stopped");
        }
    }

    /// One worker pulse, in order: snippet generation, chain appending,
    /// gap fetching, current-chain insertion, pruning.
    pub fn work_once(&self) {
        {
            let mut state = self.state.write();
            state.gen_snippet_chains();
            if let Err(err) = state.append_snippets(self.disk.as_ref()) {
                warn!(error = %err, "append snippets failed");
            }
            for gap in state.missing_predecessors() {
                self.fetcher.fetch(gap, 1);
            }
        }

        self.check_current_insert();

        self.state.write().prune(self.disk.head().height);
    }

    /// One fork-check pulse.
    pub fn check_fork(&self) {
        let (longest, current) = {
            let state = self.state.read();
            (state.longest_chain_id(), state.current_id())
        };
        if longest == current {
            return;
        }
        if let Err(err) = self.snapshot_fork(longest, current) {
            error!(error = %err, "snapshot fork switch failed");
        }
    }

    // =========================================================================
    // INSERTION
    // =========================================================================

    /// Try to advance the current chain, dispatching PENDING/FAIL verdicts
    /// to their recovery paths.
    pub fn check_current_insert(&self) {
        if self.state.read().current().size() == 0 {
            return;
        }
        if let Some((stat, block)) = self.snapshot_try_insert() {
            match stat.result {
                VerifyResult::Fail => self.insert_verify_fail(&block, &stat),
                VerifyResult::Pending => self.insert_verify_pending(&block, &stat),
                VerifyResult::Success => unreachable!("success verdicts are consumed by the walk"),
            }
        }
    }

    /// Walk the current chain from the tail upward, inserting verified
    /// blocks in order. Returns the first block whose verdict needs the
    /// pending/fail handlers.
    fn snapshot_try_insert(&self) -> Option<(SnapshotVerifyStat, Arc<SnapshotBlock>)> {
        let _pool_guard = self.pool_lock.read();
        let _insert_guard = self.r_mu.lock();

        let (min_height, head_height) = {
            let state = self.state.read();
            let current = state.current();
            (current.tail_height() + 1, current.head_height())
        };

        for height in min_height..=head_height {
            let version = self.fork_version();
            let block = {
                let mut state = self.state.write();
                let Some(block) = state.current_mut().get_block_mut(height) else {
                    // Gap inside the current chain; wait for the fetcher.
                    return None;
                };
                if !block.check_fork_version(version) {
                    block.reset_fork_version(version);
                }
                block.clone()
            };

            let stat = self.verifier.verify_snapshot(&block.block);

            // The fork version moved while verifying: the verdict may be
            // stale. Re-stamp and retry on the next pulse.
            let version_now = self.fork_version();
            if version != version_now {
                let mut state = self.state.write();
                if let Some(block) = state.current_mut().get_block_mut(height) {
                    block.reset_fork_version(version_now);
                }
                continue;
            }

            match stat.result {
                VerifyResult::Pending => return Some((stat, Arc::clone(&block.block))),
                VerifyResult::Fail => {
                    error!(
                        hash = %ledger_types::short_hash(&block.hash()),
                        height = block.height(),
                        detail = %stat.error_message(),
                        "snapshot verify fail"
                    );
                    return Some((stat, Arc::clone(&block.block)));
                }
                VerifyResult::Success => {
                    let tail_height = self.state.read().current().tail_height();
                    if block.height() != tail_height + 1 {
                        // Out of order; wait for the predecessor.
                        return None;
                    }
                    if let Err(err) = self.disk.insert_snapshot_block(&block.block) {
                        error!(
                            hash = %ledger_types::short_hash(&block.hash()),
                            height = block.height(),
                            error = %err,
                            "insert snapshot chain fail"
                        );
                        return None;
                    }
                    self.block_pool.after_insert(&block.block);
                    self.state
                        .write()
                        .current_mut()
                        .advance_tail(block.hash_height());
                }
            }
        }
        None
    }

    /// Bypass the pending queue: verify now, write through on success,
    /// error out otherwise.
    pub fn add_direct_block(&self, block: SnapshotBlock) -> Result<(), PoolError> {
        let _insert_guard = self.r_mu.lock();

        let stat = self.verifier.verify_snapshot(&block);
        match stat.result {
            VerifyResult::Pending => Err(PoolError::Pending(format!(
                "snapshot {} height {}",
                ledger_types::short_hash(&block.hash),
                block.height
            ))),
            VerifyResult::Fail => Err(PoolError::VerifyFailed(stat.error_message())),
            VerifyResult::Success => {
                self.disk.insert_snapshot_block(&block)?;
                self.block_pool.after_insert(&block);
                let head = self.disk.head();
                self.state.write().current_mut().advance_tail(head);
                Ok(())
            }
        }
    }

    // =========================================================================
    // FAIL / PENDING RECOVERY
    // =========================================================================

    /// FAIL verdict: fork every pinned account whose per-account result
    /// failed.
    fn insert_verify_fail(&self, block: &SnapshotBlock, stat: &SnapshotVerifyStat) {
        let mut accounts: BTreeMap<Address, HashHeight> = BTreeMap::new();
        for (address, pinned) in &block.snapshot_content {
            if stat.results.get(address) == Some(&VerifyResult::Fail) {
                accounts.insert(*address, *pinned);
            }
        }
        if !accounts.is_empty() {
            self.fork_accounts(&accounts);
        }
    }

    /// PENDING verdict: ask the account pool to pend each account to its
    /// pinned height; accounts that report a resulting hash-height are
    /// forked like failures.
    fn insert_verify_pending(&self, block: &SnapshotBlock, stat: &SnapshotVerifyStat) {
        let mut accounts: BTreeMap<Address, HashHeight> = BTreeMap::new();
        for (address, pinned) in &block.snapshot_content {
            if stat.results.get(address) != Some(&VerifyResult::Pending) {
                continue;
            }
            match self.account_pool.pending_account_to(address, pinned) {
                Ok(Some(_)) => {
                    accounts.insert(*address, *pinned);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(
                        address = %hex_addr(address),
                        target = %pinned,
                        error = %err,
                        "pending for account fail"
                    );
                }
            }
        }
        if !accounts.is_empty() {
            self.fork_accounts(&accounts);
        }
    }

    /// Fork the given accounts under the pool write lock and invalidate
    /// cached verdicts.
    fn fork_accounts(&self, accounts: &BTreeMap<Address, HashHeight>) {
        let _pool_guard = self.pool_lock.write();

        for (address, target) in accounts {
            if let Err(err) = self.account_pool.fork_account_to(address, target) {
                error!(
                    address = %hex_addr(address),
                    target = %target,
                    error = %err,
                    "fork account fail"
                );
            }
        }

        self.version.fetch_add(1, Ordering::SeqCst);
    }

    // =========================================================================
    // FORK SWITCH
    // =========================================================================

    /// Switch the current chain to `longest`: locate the deepest block the
    /// two chains share, roll the disk chain back to it, fork the affected
    /// accounts, retarget current and bump the fork version, all under the
    /// pool write lock.
    fn snapshot_fork(&self, longest_id: uuid::Uuid, current_id: uuid::Uuid) -> Result<(), PoolError> {
        warn!(pool = %self.config.name, "snapshot chain start fork");
        let _pool_guard = self.pool_lock.write();

        let (forked, key_point) = {
            let state = self.state.read();
            if state.current_id() != current_id {
                // The current chain changed between the check and the lock.
                return Ok(());
            }
            let Some(longest) = state.get_chain(longest_id) else {
                // The fork vanished between the check and the lock.
                return Ok(());
            };
            let Some(forked) = self.find_fork_point(longest, state.current())? else {
                return Err(PoolError::ForkPointMissing);
            };
            let key_point = longest
                .get_block(forked.height + 1)
                .map(SnapshotPoolBlock::hash_height);
            (forked, key_point)
        };

        let Some(key_point) = key_point else {
            return Err(PoolError::KeyPointMissing {
                forked_height: forked.height,
            });
        };
        info!(height = key_point.height, hash = %key_point, "fork point");

        let (snapshots, accounts) = self.disk.rollback_to(forked.height)?;
        if !snapshots.is_empty() {
            info!(rolled_back = snapshots.len(), "disk chain rolled back for fork");
        }

        for address in &accounts {
            self.account_pool.fork_account_to(address, &forked)?;
        }

        self.state.write().switch_current(longest_id, forked);
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Deepest block `longest` shares with the canonical history: the
    /// current chain's pending blocks, or the disk chain below the current
    /// tail. Walks both views down from the lower of the two heads until
    /// the hashes meet.
    fn find_fork_point(
        &self,
        longest: &ForkedChain,
        current: &ForkedChain,
    ) -> Result<Option<HashHeight>, PoolError> {
        let mut height = longest.head_height().min(current.head_height());
        loop {
            let Some(on_longest) = longest.hash_at(height) else {
                // Below the longest chain's recorded history: nothing left
                // to compare against.
                return Ok(None);
            };
            let on_canonical = match current.hash_at(height) {
                Some(hash) => Some(hash),
                None => self.disk.block_at(height)?.map(|block| block.hash),
            };
            if on_canonical == Some(on_longest) {
                return Ok(Some(HashHeight::new(on_longest, height)));
            }
            if height == 0 {
                return Ok(None);
            }
            height -= 1;
        }
    }
}

fn hex_addr(address: &Address) -> String {
    hex::encode(address)
}
