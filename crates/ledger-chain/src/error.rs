//! # Insertion Errors
//!
//! Errors returned by the public entry points of the insertion pipeline.
//! Store-level failures mid-pipeline are not represented here: once any
//! store has been written, a failure in a later store is fatal (see
//! `fatal`).

use ledger_types::{AccountBlock, SnapshotContent};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum InsertError {
    /// The snapshot pins account heights the unconfirmed cache cannot
    /// produce. Carries a full diagnostic of what was requested vs. what
    /// was available.
    #[error("lack block, {diagnostic}")]
    LackBlock { diagnostic: String },

    /// The snapshot does not extend the current head.
    #[error("snapshot out of order: height {height}, head height {head_height}")]
    OutOfOrder { height: u64, head_height: u64 },
}

/// Render the `snapshotContent` vs. candidate-block diagnostic for the
/// lack-block error.
pub(crate) fn format_lack_block(content: &SnapshotContent, blocks: &[AccountBlock]) -> String {
    let mut out = String::from("SnapshotContent: ");
    for (address, hash_height) in content {
        out.push_str(&format!("{} {}, ", hex::encode(address), hash_height));
    }
    out.push_str("| Blocks: ");
    for block in blocks {
        out.push_str(&format!(
            "{} account {} height {}, ",
            ledger_types::short_hash(&block.hash),
            hex::encode(block.account_address),
            block.height
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::{HashHeight, SnapshotContent};

    #[test]
    fn test_lack_block_diagnostic_lists_content_and_blocks() {
        let mut content = SnapshotContent::new();
        content.insert([1u8; 20], HashHeight::new([2u8; 32], 7));

        let diagnostic = format_lack_block(&content, &[]);
        assert!(diagnostic.contains("SnapshotContent"));
        assert!(diagnostic.contains("@7"));
        assert!(diagnostic.contains("| Blocks:"));
    }
}
