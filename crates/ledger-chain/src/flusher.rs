//! # Flusher
//!
//! Sequences durable flushes across every store. The insertion pipeline
//! runs it once per snapshot insertion, after all writes and before the
//! post-insert event, so downstream consumers only ever observe flushed
//! state.

use crate::fatal::crit;
use crate::snapshot_chain::SnapshotChain;
use crate::store::{BlockDb, IndexDb, StateDb};

#[derive(Default)]
pub(crate) struct Flusher;

impl Flusher {
    /// Flush every store; a flush failure after committed writes cannot be
    /// reconciled and aborts.
    pub(crate) fn flush(
        &self,
        block_db: &mut BlockDb,
        index_db: &mut IndexDb,
        state_db: &mut StateDb,
        snapshot_chain: &mut SnapshotChain,
    ) {
        if let Err(err) = block_db.flush() {
            crit("Flusher::flush", &format!("block db flush failed: {err}"));
        }
        if let Err(err) = index_db.flush() {
            crit("Flusher::flush", &format!("index db flush failed: {err}"));
        }
        if let Err(err) = state_db.flush() {
            crit("Flusher::flush", &format!("state db flush failed: {err}"));
        }
        if let Err(err) = snapshot_chain.flush() {
            crit(
                "Flusher::flush",
                &format!("snapshot chain flush failed: {err}"),
            );
        }
    }
}
