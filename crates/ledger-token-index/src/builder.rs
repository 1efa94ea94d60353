//! # Token-Head Index Builder
//!
//! Tails the chain event log and materializes the per-(account, token)
//! head-hash linked lists. Runs as a background service: a synchronous
//! build on start, then one build pass per tick until stopped.

use crate::config::TokenIndexConfig;
use crate::error::IndexError;
use crate::keys::{
    encode_key, KP_ACCOUNT_TOKEN_META, KP_BLOCK_LIST_BY_TOKEN, KP_CONSUME_ID, KP_HEAD_HASH,
};
use crate::store::{DirStoreFactory, IndexStoreFactory};
use ledger_chain::{BatchOperation, KeyValueStore, StoreError};
use ledger_types::{
    Account, AccountBlock, Address, Chain, EventKind, Hash, TokenId, ZERO_TOKEN_ID,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Stopped,
    Started,
}

struct Lifecycle {
    status: Status,
    shutdown: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

/// The token-head index service.
pub struct TokenHeadIndex {
    chain: Arc<dyn Chain>,
    factory: Box<dyn IndexStoreFactory>,
    config: TokenIndexConfig,

    db: Mutex<Box<dyn KeyValueStore>>,

    lifecycle: Mutex<Lifecycle>,
    /// Ensures only one build pass runs at a time.
    build_lock: Mutex<()>,
}

impl TokenHeadIndex {
    /// Open the index under `<data_dir>/ledger_index`.
    pub fn open(config: TokenIndexConfig, chain: Arc<dyn Chain>) -> Result<Arc<Self>, IndexError> {
        let factory = Box::new(DirStoreFactory::new(config.index_dir()));
        Self::with_factory(config, chain, factory)
    }

    /// Open the index over an explicit store factory.
    ///
    /// A corrupted store is wiped and recreated; any other open failure is
    /// returned to the caller.
    pub fn with_factory(
        config: TokenIndexConfig,
        chain: Arc<dyn Chain>,
        factory: Box<dyn IndexStoreFactory>,
    ) -> Result<Arc<Self>, IndexError> {
        let db = match factory.open() {
            Ok(db) => db,
            Err(StoreError::Corrupted(detail)) => {
                warn!(%detail, "index store corrupted, wiping");
                factory.wipe()?;
                factory.open()?
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Arc::new(Self {
            chain,
            factory,
            config,
            db: Mutex::new(db),
            lifecycle: Mutex::new(Lifecycle {
                status: Status::Stopped,
                shutdown: None,
                worker: None,
            }),
            build_lock: Mutex::new(()),
        }))
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start the service: consistency check, one synchronous build, then a
    /// ticker task. Re-entrant starts are no-ops.
    pub fn start(self: &Arc<Self>) -> Result<(), IndexError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.status == Status::Started {
            return Ok(());
        }

        self.check_and_init_data()?;
        if let Err(err) = self.build() {
            warn!(error = %err, "initial index build failed, will retry on tick");
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let index = Arc::clone(self);
        let tick_interval = self.config.tick_interval;
        let worker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = index.build() {
                            warn!(error = %err, "index build failed, will retry on tick");
                        }
                    }
                    _ = shutdown_rx.changed() => return,
                }
            }
        });

        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.worker = Some(worker);
        lifecycle.status = Status::Started;
        info!("token-head index started");
        Ok(())
    }

    /// Stop the service, draining the ticker and joining the worker.
    /// Re-entrant stops are no-ops.
    pub async fn stop(&self) {
        let worker = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.status == Status::Stopped {
                return;
            }
            lifecycle.status = Status::Stopped;
            if let Some(shutdown) = lifecycle.shutdown.take() {
                let _ = shutdown.send(true);
            }
            lifecycle.worker.take()
        };
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        info!("token-head index stopped");
    }

    /// Whether the background worker is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.lifecycle.lock().status == Status::Started
    }

    /// Startup consistency check: a consume-id beyond the chain's latest
    /// event id means the chain was rolled back below us; recreate the
    /// index from scratch.
    fn check_and_init_data(&self) -> Result<(), IndexError> {
        let latest = self.chain.latest_block_event_id()?;
        let consume_id = self.get_consume_id()?;
        if let Some(consume_id) = consume_id {
            if consume_id > latest {
                warn!(
                    consume_id,
                    latest, "consume id beyond event log, recreating index"
                );
                self.wipe_and_reinit()?;
            }
        }
        Ok(())
    }

    fn wipe_and_reinit(&self) -> Result<(), IndexError> {
        let mut db = self.db.lock();
        self.factory.wipe()?;
        *db = self.factory.open()?;
        Ok(())
    }

    // =========================================================================
    // BUILD
    // =========================================================================

    /// One build pass: consume events from the persisted consume-id through
    /// the chain's latest event id, checkpointing every
    /// `event_num_per_batch` events.
    ///
    /// Any error aborts the pass; the next tick retries from the persisted
    /// consume-id.
    pub fn build(&self) -> Result<(), IndexError> {
        let _guard = self.build_lock.lock();

        let first = self.get_consume_id()?.unwrap_or(1);
        let latest = self.chain.latest_block_event_id()?;
        if first > latest {
            return Ok(());
        }

        let mut unsaved_blocks: BTreeMap<Address, Vec<AccountBlock>> = BTreeMap::new();
        // Blocks referenced by an ADD but already pruned from the chain; a
        // DELETE of the same hash within the pass annihilates pairwise.
        let mut not_found: HashSet<Hash> = HashSet::new();
        let mut event_num = 0u64;

        for event_id in first..=latest {
            let event = self
                .chain
                .get_event(event_id)?
                .ok_or(IndexError::EventGap { event_id })?;

            match event.kind {
                EventKind::Add => {
                    for hash in &event.hashes {
                        match self.chain.get_account_block_by_hash(hash)? {
                            Some(block) => unsaved_blocks
                                .entry(block.account_address)
                                .or_default()
                                .push(block),
                            None => {
                                not_found.insert(*hash);
                            }
                        }
                    }
                }
                EventKind::Delete => {
                    for hash in &event.hashes {
                        if not_found.remove(hash) {
                            continue;
                        }
                        self.delete_hash(*hash)?;
                    }
                }
            }

            event_num += 1;
            if event_id >= latest || event_num >= self.config.event_num_per_batch {
                for (address, blocks) in std::mem::take(&mut unsaved_blocks) {
                    let account = self.chain.get_account(&address)?;
                    self.add_blocks(account.account_id, &blocks)?;
                }
                event_num = 0;
                self.update_consume_id(event_id)?;
            }
        }

        debug!(from = first, to = latest, "index build pass complete");
        Ok(())
    }

    /// Index a batch of one account's blocks, oldest first.
    fn add_blocks(&self, account_id: u64, blocks: &[AccountBlock]) -> Result<(), IndexError> {
        let mut db = self.db.lock();
        let mut batch = Vec::new();
        // Heads updated within this batch but not yet written.
        let mut unsaved_head: BTreeMap<TokenId, Hash> = BTreeMap::new();

        for block in blocks {
            if db
                .exists(&encode_key(KP_BLOCK_LIST_BY_TOKEN, &[&block.hash]))?
            {
                continue;
            }

            let token_id = self.block_token_id(block)?;

            let prev_head = match unsaved_head.get(&token_id) {
                Some(hash) => Some(*hash),
                None => get_head_hash(db.as_ref(), account_id, &token_id)?,
            };

            let value = prev_head.map(|h| h.to_vec()).unwrap_or_default();
            batch.push(BatchOperation::put(
                encode_key(KP_BLOCK_LIST_BY_TOKEN, &[&block.hash]),
                value,
            ));
            unsaved_head.insert(token_id, block.hash);
        }

        for (token_id, head_hash) in unsaved_head {
            push_head_hash_ops(&mut batch, account_id, &token_id, &head_hash);
        }

        db.atomic_batch_write(batch)?;
        Ok(())
    }

    /// Handle a DELETE event for `head_hash`: rewind the head of its
    /// `(account, token)` list to the newest predecessor the chain still
    /// has, dropping the stale list entries and reverse index on the way.
    ///
    /// A hash with no reverse-index entry is not a head we track; no-op.
    fn delete_hash(&self, head_hash: Hash) -> Result<(), IndexError> {
        let mut db = self.db.lock();

        let Some(value) = db.get(&encode_key(KP_HEAD_HASH, &[&head_hash]))? else {
            return Ok(());
        };
        let (account_id, token_id) = parse_head_hash_value(&value)?;

        // Walk backwards until a predecessor the chain confirms still
        // exists (or the list runs out). Everything walked over is stale.
        let mut stale = vec![head_hash];
        let mut new_head: Option<Hash> = Some(head_hash);
        loop {
            let prev = get_prev_hash(db.as_ref(), &new_head.expect("loop holds a hash"))?;
            new_head = prev;
            match new_head {
                None => break,
                Some(hash) => {
                    if self.chain.is_account_block_existed(&hash)? {
                        break;
                    }
                    stale.push(hash);
                }
            }
        }

        let mut batch = vec![
            BatchOperation::delete(encode_key(
                KP_ACCOUNT_TOKEN_META,
                &[&account_id.to_be_bytes(), &token_id],
            )),
            BatchOperation::delete(encode_key(KP_HEAD_HASH, &[&head_hash])),
        ];
        for hash in &stale {
            batch.push(BatchOperation::delete(encode_key(
                KP_BLOCK_LIST_BY_TOKEN,
                &[hash],
            )));
        }
        if let Some(hash) = new_head {
            push_head_hash_ops(&mut batch, account_id, &token_id, &hash);
        }

        db.atomic_batch_write(batch)?;
        Ok(())
    }

    /// Token a block belongs to: genesis blocks index under the zero
    /// token, sends under their own token, receives under the referenced
    /// send block's token.
    fn block_token_id(&self, block: &AccountBlock) -> Result<TokenId, IndexError> {
        if self.chain.is_genesis_account_block(block) {
            return Ok(ZERO_TOKEN_ID);
        }
        match block.from_block_hash() {
            None => Ok(block.token_id),
            Some(from_block_hash) => {
                let send_block = self
                    .chain
                    .get_account_block_by_hash(&from_block_hash)?
                    .ok_or(IndexError::SendBlockMissing { from_block_hash })?;
                Ok(send_block.token_id)
            }
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Walk the token list newest-first: from `origin` (must be indexed) or
    /// the persisted head, following back-pointers up to `count` entries.
    pub fn get_block_hash_list(
        &self,
        account: &Account,
        origin: Option<&Hash>,
        token_id: &TokenId,
        count: u64,
    ) -> Result<Vec<Hash>, IndexError> {
        let db = self.db.lock();

        let head = match origin {
            None => match get_head_hash(db.as_ref(), account.account_id, token_id)? {
                Some(hash) => hash,
                None => return Ok(Vec::new()),
            },
            Some(origin) => {
                if !db.exists(&encode_key(KP_BLOCK_LIST_BY_TOKEN, &[origin]))? {
                    return Err(IndexError::MissingOrigin { hash: *origin });
                }
                *origin
            }
        };

        let mut hash_list = vec![head];
        let mut current = head;
        for _ in 1..count {
            match get_prev_hash(db.as_ref(), &current)? {
                Some(prev) => {
                    hash_list.push(prev);
                    current = prev;
                }
                None => break,
            }
        }
        Ok(hash_list)
    }

    /// Persisted head hash for `(account, token)`, if any.
    pub fn head_hash(
        &self,
        account_id: u64,
        token_id: &TokenId,
    ) -> Result<Option<Hash>, IndexError> {
        get_head_hash(self.db.lock().as_ref(), account_id, token_id)
    }

    /// Back-pointer of an indexed block, `None` at the list tail.
    pub fn prev_hash(&self, hash: &Hash) -> Result<Option<Hash>, IndexError> {
        get_prev_hash(self.db.lock().as_ref(), hash)
    }

    /// Whether the block hash is indexed at all.
    pub fn is_indexed(&self, hash: &Hash) -> Result<bool, IndexError> {
        Ok(self
            .db
            .lock()
            .exists(&encode_key(KP_BLOCK_LIST_BY_TOKEN, &[hash]))?)
    }

    /// Progress checkpoint: the event id the next build pass starts at
    /// (inclusive; the last processed event is re-read, idempotently).
    /// `None` before the first checkpoint.
    pub fn get_consume_id(&self) -> Result<Option<u64>, IndexError> {
        match self.db.lock().get(&encode_key(KP_CONSUME_ID, &[]))? {
            Some(bytes) => Ok(Some(u64::from_be_bytes(
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| IndexError::Corrupted("consume id".into()))?,
            ))),
            None => Ok(None),
        }
    }

    fn update_consume_id(&self, event_id: u64) -> Result<(), IndexError> {
        self.db
            .lock()
            .put(&encode_key(KP_CONSUME_ID, &[]), &event_id.to_be_bytes())?;
        Ok(())
    }
}

fn get_head_hash(
    db: &dyn KeyValueStore,
    account_id: u64,
    token_id: &TokenId,
) -> Result<Option<Hash>, IndexError> {
    let key = encode_key(KP_ACCOUNT_TOKEN_META, &[&account_id.to_be_bytes(), token_id]);
    match db.get(&key)? {
        Some(bytes) => Ok(Some(parse_hash(&bytes)?)),
        None => Ok(None),
    }
}

fn get_prev_hash(db: &dyn KeyValueStore, hash: &Hash) -> Result<Option<Hash>, IndexError> {
    match db.get(&encode_key(KP_BLOCK_LIST_BY_TOKEN, &[hash]))? {
        Some(bytes) if bytes.is_empty() => Ok(None),
        Some(bytes) => Ok(Some(parse_hash(&bytes)?)),
        None => Ok(None),
    }
}

/// Write both the forward meta entry and the reverse head index for a new
/// head.
fn push_head_hash_ops(
    batch: &mut Vec<BatchOperation>,
    account_id: u64,
    token_id: &TokenId,
    head_hash: &Hash,
) {
    batch.push(BatchOperation::put(
        encode_key(KP_ACCOUNT_TOKEN_META, &[&account_id.to_be_bytes(), token_id]),
        head_hash.to_vec(),
    ));
    let mut value = Vec::with_capacity(8 + token_id.len());
    value.extend_from_slice(&account_id.to_be_bytes());
    value.extend_from_slice(token_id);
    batch.push(BatchOperation::put(
        encode_key(KP_HEAD_HASH, &[head_hash]),
        value,
    ));
}

fn parse_head_hash_value(value: &[u8]) -> Result<(u64, TokenId), IndexError> {
    if value.len() != 8 + 32 {
        return Err(IndexError::Corrupted("head hash entry".into()));
    }
    let account_id = u64::from_be_bytes(value[..8].try_into().expect("length checked"));
    let token_id: TokenId = value[8..].try_into().expect("length checked");
    Ok((account_id, token_id))
}

fn parse_hash(bytes: &[u8]) -> Result<Hash, IndexError> {
    bytes
        .try_into()
        .map_err(|_| IndexError::Corrupted("hash entry".into()))
}
