//! Snapshot pool scenarios over mock collaborators: contiguous insertion,
//! the fork switch, and the FAIL/PENDING recovery paths.

use ledger_pool::{
    AccountPoolOps, BlockPoolNotifier, DiskChain, PoolConfig, PoolError, SnapshotFetcher,
    SnapshotPool, SnapshotVerifier, SnapshotVerifyStat, VerifyResult,
};
use ledger_types::{Address, Hash, HashHeight, SnapshotBlock, SnapshotContent};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const ADDR_A: Address = [0xaa; 20];

// =============================================================================
// MOCK COLLABORATORS
// =============================================================================

/// Disk chain that enforces linkage on insert and supports rollback.
struct MockDisk {
    blocks: Mutex<Vec<SnapshotBlock>>,
}

impl MockDisk {
    fn new(genesis: SnapshotBlock) -> Arc<Self> {
        Arc::new(Self {
            blocks: Mutex::new(vec![genesis]),
        })
    }

    fn hashes(&self) -> Vec<Hash> {
        self.blocks.lock().iter().map(|b| b.hash).collect()
    }
}

impl DiskChain for MockDisk {
    fn head(&self) -> HashHeight {
        self.blocks.lock().last().expect("genesis").hash_height()
    }

    fn block_at(&self, height: u64) -> Result<Option<HashHeight>, PoolError> {
        Ok(self
            .blocks
            .lock()
            .iter()
            .find(|b| b.height == height)
            .map(|b| b.hash_height()))
    }

    fn insert_snapshot_block(&self, block: &SnapshotBlock) -> Result<(), PoolError> {
        let mut blocks = self.blocks.lock();
        let head = blocks.last().expect("genesis");
        if block.prev_hash != head.hash || block.height != head.height + 1 {
            return Err(PoolError::Insert(format!(
                "out of order: {} after {}",
                block.height, head.height
            )));
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn rollback_to(&self, height: u64) -> Result<(Vec<SnapshotBlock>, Vec<Address>), PoolError> {
        let mut blocks = self.blocks.lock();
        let keep = blocks.iter().take_while(|b| b.height <= height).count();
        let removed: Vec<SnapshotBlock> = blocks.split_off(keep);
        let mut affected: Vec<Address> = removed
            .iter()
            .flat_map(|b| b.snapshot_content.keys().copied())
            .collect();
        affected.sort();
        affected.dedup();
        Ok((removed, affected))
    }
}

/// Verifier with per-hash overrides; unknown hashes verify as SUCCESS.
#[derive(Default)]
struct MockVerifier {
    overrides: Mutex<HashMap<Hash, SnapshotVerifyStat>>,
}

impl MockVerifier {
    fn set(&self, hash: Hash, stat: SnapshotVerifyStat) {
        self.overrides.lock().insert(hash, stat);
    }
}

impl SnapshotVerifier for MockVerifier {
    fn verify_snapshot(&self, block: &SnapshotBlock) -> SnapshotVerifyStat {
        self.overrides
            .lock()
            .get(&block.hash)
            .cloned()
            .unwrap_or_else(SnapshotVerifyStat::success)
    }
}

#[derive(Default)]
struct MockAccountPool {
    forked: Mutex<Vec<(Address, HashHeight)>>,
    pended: Mutex<Vec<(Address, HashHeight)>>,
    /// What `pending_account_to` reports back.
    pending_result: Mutex<Option<HashHeight>>,
}

impl AccountPoolOps for MockAccountPool {
    fn fork_account_to(&self, address: &Address, target: &HashHeight) -> Result<(), PoolError> {
        self.forked.lock().push((*address, *target));
        Ok(())
    }

    fn pending_account_to(
        &self,
        address: &Address,
        target: &HashHeight,
    ) -> Result<Option<HashHeight>, PoolError> {
        self.pended.lock().push((*address, *target));
        Ok(*self.pending_result.lock())
    }
}

#[derive(Default)]
struct RecordingFetcher {
    calls: Mutex<Vec<(HashHeight, u64)>>,
}

impl SnapshotFetcher for RecordingFetcher {
    fn fetch(&self, start: HashHeight, count: u64) {
        self.calls.lock().push((start, count));
    }
}

#[derive(Default)]
struct CountingNotifier {
    inserted: Mutex<Vec<Hash>>,
}

impl BlockPoolNotifier for CountingNotifier {
    fn after_insert(&self, block: &SnapshotBlock) {
        self.inserted.lock().push(block.hash);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn genesis() -> SnapshotBlock {
    let mut block = SnapshotBlock {
        hash: [0u8; 32],
        prev_hash: [0u8; 32],
        height: 1,
        timestamp: 1,
        snapshot_content: SnapshotContent::new(),
    };
    block.hash = block.compute_hash();
    block
}

fn block_after(prev: &SnapshotBlock, salt: u64) -> SnapshotBlock {
    let mut block = SnapshotBlock {
        hash: [0u8; 32],
        prev_hash: prev.hash,
        height: prev.height + 1,
        timestamp: 1000 + prev.height + salt * 1000,
        snapshot_content: SnapshotContent::new(),
    };
    block.hash = block.compute_hash();
    block
}

struct Rig {
    pool: Arc<SnapshotPool>,
    disk: Arc<MockDisk>,
    verifier: Arc<MockVerifier>,
    account_pool: Arc<MockAccountPool>,
    fetcher: Arc<RecordingFetcher>,
    notifier: Arc<CountingNotifier>,
}

fn rig() -> Rig {
    let disk = MockDisk::new(genesis());
    let verifier = Arc::new(MockVerifier::default());
    let account_pool = Arc::new(MockAccountPool::default());
    let fetcher = Arc::new(RecordingFetcher::default());
    let notifier = Arc::new(CountingNotifier::default());
    let pool = SnapshotPool::new(
        PoolConfig::default(),
        Arc::clone(&disk) as Arc<dyn DiskChain>,
        Arc::clone(&verifier) as Arc<dyn SnapshotVerifier>,
        Arc::clone(&fetcher) as Arc<dyn SnapshotFetcher>,
        Arc::clone(&account_pool) as Arc<dyn AccountPoolOps>,
        Arc::clone(&notifier) as Arc<dyn BlockPoolNotifier>,
    );
    Rig {
        pool,
        disk,
        verifier,
        account_pool,
        fetcher,
        notifier,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn contiguous_blocks_insert_in_order() {
    let rig = rig();
    let g = genesis();
    let s1 = block_after(&g, 0);
    let s2 = block_after(&s1, 0);
    let s3 = block_after(&s2, 0);

    // Out-of-order arrival.
    rig.pool.add_block(s3.clone());
    rig.pool.add_block(s1.clone());
    rig.pool.add_block(s2.clone());
    rig.pool.work_once();

    assert_eq!(rig.disk.hashes(), vec![g.hash, s1.hash, s2.hash, s3.hash]);
    assert_eq!(rig.notifier.inserted.lock().len(), 3);
    assert_eq!(rig.pool.fork_version(), 0);
}

#[test]
fn fork_switch_rolls_back_and_replays_longest() {
    let rig = rig();
    let g = genesis();
    let s1 = block_after(&g, 0);
    let s2 = block_after(&s1, 0);
    let s3 = block_after(&s2, 0);
    for block in [&s1, &s2, &s3] {
        rig.pool.add_block(block.clone());
    }
    rig.pool.work_once();
    assert_eq!(rig.disk.head().height, 4);

    // A longer fork diverging after s1.
    let s2_alt = block_after(&s1, 7);
    let s3_alt = block_after(&s2_alt, 7);
    let s4_alt = block_after(&s3_alt, 7);
    assert_ne!(s2_alt.hash, s2.hash);
    for block in [&s2_alt, &s3_alt, &s4_alt] {
        rig.pool.add_block(block.clone());
    }
    // Attach the fork but skip insertion noise: one pulse links it.
    rig.pool.work_once();

    let version_before = rig.pool.fork_version();
    rig.pool.check_fork();
    assert_eq!(rig.pool.fork_version(), version_before + 1);

    // Disk was rolled back to s1 during the switch; the next pulse
    // replays the fork into disk.
    rig.pool.work_once();
    assert_eq!(
        rig.disk.hashes(),
        vec![g.hash, s1.hash, s2_alt.hash, s3_alt.hash, s4_alt.hash]
    );

    // The switch is stable: no further fork detected.
    let version_after = rig.pool.fork_version();
    rig.pool.check_fork();
    assert_eq!(rig.pool.fork_version(), version_after);
}

#[test]
fn fork_switch_handles_a_fork_off_a_fork() {
    let rig = rig();
    let g = genesis();
    let s1 = block_after(&g, 0);
    let s2 = block_after(&s1, 0);
    let s3 = block_after(&s2, 0);
    for block in [&s1, &s2, &s3] {
        rig.pool.add_block(block.clone());
    }
    rig.pool.work_once();
    assert_eq!(rig.disk.head().height, 4);

    // Fork B diverges after s1; no fork check runs yet, so it just sits
    // in the pool as a competing chain.
    let s2_b = block_after(&s1, 3);
    let s3_b = block_after(&s2_b, 3);
    let s4_b = block_after(&s3_b, 3);
    for block in [&s2_b, &s3_b, &s4_b] {
        rig.pool.add_block(block.clone());
    }
    rig.pool.work_once();
    assert_eq!(rig.pool.fork_version(), 0);
    assert_eq!(rig.disk.head().height, 4);

    // Fork C diverges off B (after s2_b), not off current or disk, and
    // outgrows everything.
    let s3_c = block_after(&s2_b, 8);
    let s4_c = block_after(&s3_c, 8);
    let s5_c = block_after(&s4_c, 8);
    assert_ne!(s3_c.hash, s3_b.hash);
    for block in [&s3_c, &s4_c, &s5_c] {
        rig.pool.add_block(block.clone());
    }
    rig.pool.work_once();

    // The switch must find the real common ancestor with current (s1),
    // not C's divergence point from B (s2_b).
    rig.pool.check_fork();
    assert_eq!(rig.pool.fork_version(), 1);

    rig.pool.work_once();
    assert_eq!(
        rig.disk.hashes(),
        vec![g.hash, s1.hash, s2_b.hash, s3_c.hash, s4_c.hash, s5_c.hash]
    );

    // The switch is stable.
    rig.pool.check_fork();
    assert_eq!(rig.pool.fork_version(), 1);
}

#[test]
fn verify_fail_forks_failed_accounts() {
    let rig = rig();
    let g = genesis();

    let pinned = HashHeight::new([0x55; 32], 9);
    let mut s1 = block_after(&g, 0);
    s1.snapshot_content.insert(ADDR_A, pinned);
    s1.hash = s1.compute_hash();

    let mut results = BTreeMap::new();
    results.insert(ADDR_A, VerifyResult::Fail);
    rig.verifier.set(
        s1.hash,
        SnapshotVerifyStat {
            result: VerifyResult::Fail,
            results,
            err_msg: Some("account chain mismatch".into()),
        },
    );

    rig.pool.add_block(s1.clone());
    rig.pool.work_once();

    assert_eq!(rig.disk.head().height, 1);
    assert_eq!(*rig.account_pool.forked.lock(), vec![(ADDR_A, pinned)]);
    assert_eq!(rig.pool.fork_version(), 1);
}

#[test]
fn verify_pending_pends_then_forks_reported_accounts() {
    let rig = rig();
    let g = genesis();

    let pinned = HashHeight::new([0x66; 32], 4);
    let mut s1 = block_after(&g, 0);
    s1.snapshot_content.insert(ADDR_A, pinned);
    s1.hash = s1.compute_hash();

    let mut results = BTreeMap::new();
    results.insert(ADDR_A, VerifyResult::Pending);
    let stat = SnapshotVerifyStat {
        result: VerifyResult::Pending,
        results,
        err_msg: None,
    };
    rig.verifier.set(s1.hash, stat.clone());

    // The account pool reports nothing to fork: no version bump.
    rig.pool.add_block(s1.clone());
    rig.pool.work_once();
    assert_eq!(*rig.account_pool.pended.lock(), vec![(ADDR_A, pinned)]);
    assert!(rig.account_pool.forked.lock().is_empty());
    assert_eq!(rig.pool.fork_version(), 0);

    // Now it reports a hash-height: the account is forked like a failure.
    *rig.account_pool.pending_result.lock() = Some(pinned);
    rig.pool.work_once();
    assert_eq!(*rig.account_pool.forked.lock(), vec![(ADDR_A, pinned)]);
    assert_eq!(rig.pool.fork_version(), 1);
}

#[test]
fn gap_triggers_fetch_for_missing_predecessor() {
    let rig = rig();
    let g = genesis();
    let s1 = block_after(&g, 0);
    let s2 = block_after(&s1, 0);

    // s1 never arrives.
    rig.pool.add_block(s2.clone());
    rig.pool.work_once();

    assert_eq!(rig.disk.head().height, 1);
    let calls = rig.fetcher.calls.lock();
    assert!(!calls.is_empty());
    assert_eq!(calls[0].0, HashHeight::new(s1.hash, 2));
}

#[test]
fn direct_block_success_writes_through() {
    let rig = rig();
    let g = genesis();
    let s1 = block_after(&g, 0);

    rig.pool.add_direct_block(s1.clone()).unwrap();
    assert_eq!(rig.disk.head(), s1.hash_height());
    assert_eq!(*rig.notifier.inserted.lock(), vec![s1.hash]);
}

#[test]
fn direct_block_fail_and_pending_error_out() {
    let rig = rig();
    let g = genesis();
    let s1 = block_after(&g, 0);

    rig.verifier.set(
        s1.hash,
        SnapshotVerifyStat {
            result: VerifyResult::Fail,
            results: BTreeMap::new(),
            err_msg: Some("bad content".into()),
        },
    );
    match rig.pool.add_direct_block(s1.clone()) {
        Err(PoolError::VerifyFailed(message)) => assert_eq!(message, "bad content"),
        other => panic!("expected verify failure, got {other:?}"),
    }

    rig.verifier.set(
        s1.hash,
        SnapshotVerifyStat {
            result: VerifyResult::Pending,
            results: BTreeMap::new(),
            err_msg: None,
        },
    );
    assert!(matches!(
        rig.pool.add_direct_block(s1.clone()),
        Err(PoolError::Pending(_))
    ));
    assert_eq!(rig.disk.head().height, 1);
}

#[tokio::test]
async fn loops_start_and_stop_cleanly() {
    let rig = rig();
    let g = genesis();
    let s1 = block_after(&g, 0);

    rig.pool.start();
    rig.pool.start();
    rig.pool.add_block(s1.clone());

    // The worker loop picks the block up without manual pulses.
    for _ in 0..50 {
        if rig.disk.head().height == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(rig.disk.head(), s1.hash_height());

    rig.pool.stop().await;
    rig.pool.stop().await;
}
