//! # Embedded Genesis
//!
//! The code-embedded genesis snapshot block. A data directory whose stored
//! genesis differs from this one belongs to a different network and must
//! not be opened.

use ledger_types::{Hash, SnapshotBlock, SnapshotContent, ZERO_HASH};

/// Hash of the genesis snapshot block
/// (`a601ad0af8123a9dd85a201273276a82e41d6cc1e708bd62ea432dea76038639`).
pub const GENESIS_HASH: Hash = [
    0xa6, 0x01, 0xad, 0x0a, 0xf8, 0x12, 0x3a, 0x9d, 0xd8, 0x5a, 0x20, 0x12, 0x73, 0x27, 0x6a,
    0x82, 0xe4, 0x1d, 0x6c, 0xc1, 0xe7, 0x08, 0xbd, 0x62, 0xea, 0x43, 0x2d, 0xea, 0x76, 0x03,
    0x86, 0x39,
];

/// Height of the genesis snapshot block.
pub const GENESIS_HEIGHT: u64 = ledger_types::FIRST_HEIGHT;

/// Unix timestamp of the genesis snapshot block.
pub const GENESIS_TIMESTAMP: u64 = 1_533_550_878;

/// Hashes of the account blocks seeded by the genesis configuration.
///
/// These are the only account blocks [`crate::Chain`] classifies as
/// genesis blocks.
pub const GENESIS_ACCOUNT_BLOCK_HASHES: [Hash; 2] = [
    [
        0xcc, 0xf1, 0x31, 0xda, 0xc3, 0x7a, 0x3e, 0xc9, 0x32, 0x82, 0x90, 0xa9, 0xad, 0x39, 0xc1,
        0x60, 0xba, 0xee, 0x02, 0x59, 0x6d, 0xaf, 0x30, 0x3a, 0xd8, 0x7d, 0x93, 0x81, 0x5f, 0xce,
        0x0a, 0x5a,
    ],
    [
        0x90, 0x41, 0x96, 0xe4, 0x30, 0xc5, 0x2d, 0x06, 0x87, 0x06, 0x4a, 0x17, 0x23, 0xfa, 0x51,
        0x24, 0xda, 0x77, 0x08, 0xe7, 0xe8, 0x2d, 0x75, 0x92, 0x4a, 0x84, 0x6c, 0x4e, 0x84, 0xac,
        0x49, 0xc3,
    ],
];

/// Build the embedded genesis snapshot block.
///
/// The hash is a fixed constant, not derived from the (empty) content.
#[must_use]
pub fn genesis_snapshot_block() -> SnapshotBlock {
    SnapshotBlock {
        hash: GENESIS_HASH,
        prev_hash: ZERO_HASH,
        height: GENESIS_HEIGHT,
        timestamp: GENESIS_TIMESTAMP,
        snapshot_content: SnapshotContent::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_hash_hex() {
        assert_eq!(
            hex::encode(GENESIS_HASH),
            "a601ad0af8123a9dd85a201273276a82e41d6cc1e708bd62ea432dea76038639"
        );
    }

    #[test]
    fn test_genesis_block_shape() {
        let genesis = genesis_snapshot_block();
        assert_eq!(genesis.height, 1);
        assert_eq!(genesis.prev_hash, ZERO_HASH);
        assert!(genesis.snapshot_content.is_empty());
    }
}
