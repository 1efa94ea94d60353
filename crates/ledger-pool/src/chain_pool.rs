//! # Chain Pool
//!
//! The multi-map of forked chains plus the free-block staging area. One
//! distinguished chain, `current`, tracks the disk chain; the rest are
//! candidate forks competing to become current.

use crate::error::PoolError;
use crate::forked_chain::{ForkedChain, SnapshotPoolBlock};
use crate::ports::DiskChain;
use ledger_types::{Hash, HashHeight};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// A contiguous, prev-linked run of blocks not yet attached to any chain.
pub(crate) type Snippet = Vec<SnapshotPoolBlock>;

pub struct ChainPool {
    chains: HashMap<Uuid, ForkedChain>,
    current: Uuid,
    /// Newly arrived blocks, keyed by hash, awaiting snippet linking.
    free_blocks: HashMap<Hash, SnapshotPoolBlock>,
    /// Linked runs that could not be attached to a chain yet.
    snippets: Vec<Snippet>,
}

impl ChainPool {
    /// Start with a single current chain rooted at the disk head.
    #[must_use]
    pub fn new(disk_head: HashHeight) -> Self {
        let current_chain = ForkedChain::new(disk_head);
        let current = current_chain.chain_id();
        let mut chains = HashMap::new();
        chains.insert(current, current_chain);
        Self {
            chains,
            current,
            free_blocks: HashMap::new(),
            snippets: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_id(&self) -> Uuid {
        self.current
    }

    #[must_use]
    pub fn current(&self) -> &ForkedChain {
        &self.chains[&self.current]
    }

    pub fn current_mut(&mut self) -> &mut ForkedChain {
        self.chains.get_mut(&self.current).expect("current chain exists")
    }

    #[must_use]
    pub fn get_chain(&self, chain_id: Uuid) -> Option<&ForkedChain> {
        self.chains.get(&chain_id)
    }

    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Stage a newly arrived block. Duplicates of already-staged or
    /// already-chained hashes are dropped.
    pub fn add_free_block(&mut self, block: SnapshotPoolBlock) {
        let hash = block.hash();
        if self.free_blocks.contains_key(&hash) {
            return;
        }
        if self
            .chains
            .values()
            .any(|chain| chain.hash_at(block.height()) == Some(hash))
        {
            return;
        }
        self.free_blocks.insert(hash, block);
    }

    /// Worker step 1: link the free blocks into prev-linked snippets.
    pub fn gen_snippet_chains(&mut self) {
        if self.free_blocks.is_empty() {
            return;
        }

        let mut blocks: Vec<SnapshotPoolBlock> = self.free_blocks.drain().map(|(_, b)| b).collect();
        // Height order makes every predecessor available before its
        // successor; hash order makes ties deterministic.
        blocks.sort_by(|a, b| (a.height(), a.hash()).cmp(&(b.height(), b.hash())));

        let mut end_to_snippet: HashMap<Hash, usize> = HashMap::new();
        for block in blocks {
            match end_to_snippet.remove(&block.prev_hash()) {
                Some(index) => {
                    end_to_snippet.insert(block.hash(), index);
                    self.snippets[index].push(block);
                }
                None => {
                    end_to_snippet.insert(block.hash(), self.snippets.len());
                    self.snippets.push(vec![block]);
                }
            }
        }
    }

    /// Worker step 2: attach snippets to chains: at a head, at a
    /// mid-chain divergence point, or rooted directly on the disk chain.
    /// Unattachable snippets stay for the fetch step.
    pub fn append_snippets(&mut self, disk: &dyn DiskChain) -> Result<(), PoolError> {
        // Attaching one snippet can unblock another; repeat to a fixpoint.
        loop {
            if self.snippets.is_empty() {
                return Ok(());
            }
            let snippets = std::mem::take(&mut self.snippets);
            let mut remaining = Vec::new();
            let mut attached_any = false;
            for snippet in snippets {
                match self.attach_snippet(snippet, disk)? {
                    None => attached_any = true,
                    Some(snippet) => remaining.push(snippet),
                }
            }
            self.snippets = remaining;
            if !attached_any {
                return Ok(());
            }
        }
    }

    fn attach_snippet(
        &mut self,
        snippet: Snippet,
        disk: &dyn DiskChain,
    ) -> Result<Option<Snippet>, PoolError> {
        let first = &snippet[0];
        let prev_hash = first.prev_hash();
        let prev_height = first.height() - 1;

        // A chain whose head this snippet extends.
        let extend_target = self
            .chains
            .values()
            .find(|chain| chain.head_hash() == prev_hash && chain.head_height() == prev_height)
            .map(ForkedChain::chain_id);
        if let Some(chain_id) = extend_target {
            let chain = self.chains.get_mut(&chain_id).expect("chain id just found");
            for block in snippet {
                if !chain.try_append(block) {
                    break;
                }
            }
            return Ok(None);
        }

        // A divergence point inside an existing chain. The new fork keeps
        // that chain's tail and carries the shared prefix along, so every
        // chain's recorded history reaches back to a canonical block.
        let parent_id = self
            .chains
            .values()
            .find(|chain| {
                chain.hash_at(prev_height) == Some(prev_hash) && prev_height < chain.head_height()
            })
            .map(ForkedChain::chain_id);
        if let Some(parent_id) = parent_id {
            let parent = &self.chains[&parent_id];
            let tail = parent.tail();
            let shared_prefix = parent.blocks_through(prev_height);
            let leftover = self.new_chain_from(snippet, tail, shared_prefix);
            return Ok((!leftover.is_empty()).then_some(leftover));
        }

        // Rooted directly on the canonical disk chain.
        if let Some(on_disk) = disk.block_at(prev_height)? {
            if on_disk.hash == prev_hash {
                let tail = HashHeight::new(prev_hash, prev_height);
                let leftover = self.new_chain_from(snippet, tail, Vec::new());
                return Ok((!leftover.is_empty()).then_some(leftover));
            }
        }

        Ok(Some(snippet))
    }

    /// Create a fork rooted at `tail`, preloaded with the shared prefix it
    /// forked over; returns any snippet tail that failed to link (never,
    /// for well-formed snippets).
    fn new_chain_from(
        &mut self,
        snippet: Snippet,
        tail: HashHeight,
        shared_prefix: Vec<SnapshotPoolBlock>,
    ) -> Snippet {
        let mut chain = ForkedChain::new(tail);
        for block in shared_prefix {
            chain.try_append(block);
        }
        let mut leftover = Vec::new();
        let mut appending = true;
        for block in snippet {
            if appending && chain.try_append(block.clone()) {
                continue;
            }
            appending = false;
            leftover.push(block);
        }
        debug!(
            chain_id = %chain.chain_id(),
            tail = chain.tail_height(),
            head = chain.head_height(),
            "new forked chain"
        );
        self.chains.insert(chain.chain_id(), chain);
        leftover
    }

    /// Gaps the fetch step should request: for each unattached snippet,
    /// the `(hash, height)` of its missing predecessor.
    #[must_use]
    pub fn missing_predecessors(&self) -> Vec<HashHeight> {
        self.snippets
            .iter()
            .map(|snippet| HashHeight::new(snippet[0].prev_hash(), snippet[0].height() - 1))
            .collect()
    }

    /// The valid-prefix chain with the highest head; ties keep current.
    #[must_use]
    pub fn longest_chain_id(&self) -> Uuid {
        let current_head = self.current().head_height();
        let mut best = (self.current, current_head);
        for chain in self.chains.values() {
            if chain.chain_id() == self.current || !chain.is_contiguous() {
                continue;
            }
            if chain.head_height() > best.1 {
                best = (chain.chain_id(), chain.head_height());
            }
        }
        best.0
    }

    /// Retarget `current` at `longest`, resetting its tail to the fork
    /// point. The old current chain is dropped.
    pub fn switch_current(&mut self, longest_id: Uuid, forked: HashHeight) {
        let old = self.current;
        if let Some(chain) = self.chains.get_mut(&longest_id) {
            chain.reset_tail(forked);
        }
        self.current = longest_id;
        self.chains.remove(&old);
    }

    /// Drop dead forks: chains (other than current) that can no longer
    /// outgrow the canonical chain.
    pub fn prune(&mut self, disk_head_height: u64) {
        let current = self.current;
        self.chains
            .retain(|&id, chain| id == current || chain.head_height() > disk_head_height);
    }
}
