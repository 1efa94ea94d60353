//! # Core Domain Entities
//!
//! The ledger is a DAG of per-account chains pinned together by a single
//! snapshot chain. Account blocks live on exactly one account's chain;
//! snapshot blocks periodically checkpoint a set of account chains at fixed
//! heights.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

/// A 32-byte content hash.
pub type Hash = [u8; 32];

/// A 20-byte account address.
pub type Address = [u8; 20];

/// A 32-byte token type identifier.
pub type TokenId = [u8; 32];

/// The all-zero hash, used as the predecessor of a genesis account block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// The zero token id attributed to genesis account blocks.
pub const ZERO_TOKEN_ID: TokenId = [0u8; 32];

/// Height of the first block on any chain.
pub const FIRST_HEIGHT: u64 = 1;

/// Short hex form of a hash for log and error messages.
#[must_use]
pub fn short_hash(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

/// Full hex form of a hash.
#[must_use]
pub fn hex_hash(hash: &Hash) -> String {
    hex::encode(hash)
}

/// A `(hash, height)` pair identifying one block on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct HashHeight {
    pub hash: Hash,
    pub height: u64,
}

impl HashHeight {
    #[must_use]
    pub fn new(hash: Hash, height: u64) -> Self {
        Self { hash, height }
    }
}

impl std::fmt::Display for HashHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", short_hash(&self.hash), self.height)
    }
}

/// Direction-specific fields of an account block.
///
/// A send debits the sender and names a recipient; a receive credits the
/// recipient and points back at exactly one existing send block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountBlockBody {
    Send {
        to_address: Address,
        amount: U256,
    },
    Receive {
        /// Hash of the send block this receive consumes.
        from_block_hash: Hash,
    },
}

/// One entry on a single account's sub-chain.
///
/// Invariants:
/// - `height` is strictly monotonic per account, starting at [`FIRST_HEIGHT`].
/// - `prev_hash` equals the hash of the block at `height - 1`, or
///   [`ZERO_HASH`] at genesis.
/// - A receive block references exactly one existing send block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBlock {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub account_address: Address,
    pub height: u64,
    /// Token the block moves. For receive blocks this mirrors the send
    /// block's token and may be zero when the sender is unknown locally.
    pub token_id: TokenId,
    pub body: AccountBlockBody,
}

impl AccountBlock {
    #[must_use]
    pub fn is_send(&self) -> bool {
        matches!(self.body, AccountBlockBody::Send { .. })
    }

    #[must_use]
    pub fn is_receive(&self) -> bool {
        matches!(self.body, AccountBlockBody::Receive { .. })
    }

    /// The referenced send block hash, if this is a receive block.
    #[must_use]
    pub fn from_block_hash(&self) -> Option<Hash> {
        match self.body {
            AccountBlockBody::Receive { from_block_hash } => Some(from_block_hash),
            AccountBlockBody::Send { .. } => None,
        }
    }

    /// Compute the content hash over all identity-bearing fields.
    #[must_use]
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.prev_hash);
        hasher.update(self.account_address);
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.token_id);
        match &self.body {
            AccountBlockBody::Send { to_address, amount } => {
                hasher.update([0u8]);
                hasher.update(to_address);
                let mut amount_bytes = [0u8; 32];
                amount.to_big_endian(&mut amount_bytes);
                hasher.update(amount_bytes);
            }
            AccountBlockBody::Receive { from_block_hash } => {
                hasher.update([1u8]);
                hasher.update(from_block_hash);
            }
        }
        hasher.finalize().into()
    }
}

/// The set of account-chain positions a snapshot pins: address → the newest
/// block of that account the snapshot confirms.
///
/// Ordered so serialization and diagnostics are deterministic.
pub type SnapshotContent = BTreeMap<Address, HashHeight>;

/// A periodic checkpoint pinning multiple account chains at fixed heights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlock {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub height: u64,
    /// Unix timestamp (seconds) when the snapshot was produced.
    pub timestamp: u64,
    pub snapshot_content: SnapshotContent,
}

impl SnapshotBlock {
    /// Compute the content hash over all identity-bearing fields.
    #[must_use]
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.prev_hash);
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        for (address, hash_height) in &self.snapshot_content {
            hasher.update(address);
            hasher.update(hash_height.hash);
            hasher.update(hash_height.height.to_be_bytes());
        }
        hasher.finalize().into()
    }

    #[must_use]
    pub fn hash_height(&self) -> HashHeight {
        HashHeight::new(self.hash, self.height)
    }
}

/// A snapshot block plus the account blocks it confirms, the unit written
/// to the append-only block store in one shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotChunk {
    pub snapshot_block: SnapshotBlock,
    pub account_blocks: Vec<AccountBlock>,
}

/// A registered account: the dense numeric id assigned at first insertion
/// plus the address it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: u64,
    pub address: Address,
}

/// Kind of a block event on the chain event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Account blocks were appended.
    Add = 1,
    /// Account blocks were rolled back.
    Delete = 2,
}

impl EventKind {
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Add),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One entry of the append-only chain event log.
///
/// `event_id`s are dense and strictly increasing, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub event_id: u64,
    pub kind: EventKind,
    pub hashes: Vec<Hash>,
}

/// The state changes an account block produced when it was executed.
///
/// Balances are absolute post-block values per token; storage writes are raw
/// key-value pairs in the account's storage space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub balances: BTreeMap<TokenId, U256>,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// An account block together with its computed state delta, the input to
/// the insertion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmAccountBlock {
    pub block: AccountBlock,
    pub state: StateDelta,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_block(height: u64) -> AccountBlock {
        let mut block = AccountBlock {
            hash: ZERO_HASH,
            prev_hash: ZERO_HASH,
            account_address: [7u8; 20],
            height,
            token_id: [1u8; 32],
            body: AccountBlockBody::Send {
                to_address: [9u8; 20],
                amount: U256::from(42u64),
            },
        };
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn test_account_block_hash_changes_with_height() {
        let a = send_block(1);
        let b = send_block(2);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_account_block_body_accessors() {
        let send = send_block(1);
        assert!(send.is_send());
        assert_eq!(send.from_block_hash(), None);

        let receive = AccountBlock {
            body: AccountBlockBody::Receive {
                from_block_hash: send.hash,
            },
            ..send.clone()
        };
        assert!(receive.is_receive());
        assert_eq!(receive.from_block_hash(), Some(send.hash));
    }

    #[test]
    fn test_snapshot_hash_covers_content() {
        let mut snapshot = SnapshotBlock {
            hash: ZERO_HASH,
            prev_hash: [2u8; 32],
            height: 5,
            timestamp: 1_533_550_878,
            snapshot_content: SnapshotContent::new(),
        };
        let empty = snapshot.compute_hash();

        snapshot
            .snapshot_content
            .insert([7u8; 20], HashHeight::new([3u8; 32], 4));
        assert_ne!(empty, snapshot.compute_hash());
    }

    #[test]
    fn test_event_kind_round_trip() {
        assert_eq!(EventKind::from_byte(1), Some(EventKind::Add));
        assert_eq!(EventKind::from_byte(2), Some(EventKind::Delete));
        assert_eq!(EventKind::from_byte(3), None);
        assert_eq!(EventKind::Add.as_byte(), 1);
        assert_eq!(EventKind::Delete.as_byte(), 2);
    }

    #[test]
    fn test_hash_height_display() {
        let hh = HashHeight::new([0xab; 32], 12);
        assert_eq!(hh.to_string(), "abababababababab@12");
    }
}
