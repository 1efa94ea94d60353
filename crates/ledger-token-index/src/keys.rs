//! # Key Layout
//!
//! Every key is a single prefix byte followed by the documented fields,
//! each encoded as a u32 big-endian length and the field's big-endian
//! bytes. Length prefixes keep variable-width fields from aliasing across
//! key spaces.

/// `block hash → previous block hash in same token`.
pub const KP_BLOCK_LIST_BY_TOKEN: u8 = 1;

/// `account id ‖ token id → head block hash`.
pub const KP_ACCOUNT_TOKEN_META: u8 = 2;

/// Build progress checkpoint (event id).
pub const KP_CONSUME_ID: u8 = 3;

/// `head block hash → account id ‖ token id` (reverse index for rollback).
pub const KP_HEAD_HASH: u8 = 4;

/// Encode a key: prefix byte, then each field length-prefixed.
#[must_use]
pub fn encode_key(prefix: u8, fields: &[&[u8]]) -> Vec<u8> {
    let mut key =
        Vec::with_capacity(1 + fields.iter().map(|f| 4 + f.len()).sum::<usize>());
    key.push(prefix);
    for field in fields {
        key.extend_from_slice(&(field.len() as u32).to_be_bytes());
        key.extend_from_slice(field);
    }
    key
}
