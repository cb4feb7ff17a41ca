//! CRC16/XMODEM slot hashing, bit-exact with the Redis Cluster specification.

use crc16::{State, XMODEM};

/// Number of slots a Redis Cluster keyspace is partitioned into.
pub const SLOT_COUNT: u16 = 16384;

/// Hash a key to its cluster slot, honoring `{hash-tag}` semantics: if the key
/// contains a substring `{X}` with non-empty `X`, only `X` is hashed.
pub fn slot_of(key: &[u8]) -> u16 {
    State::<XMODEM>::calculate(hash_tag(key)) % SLOT_COUNT
}

/// Returns the hash-tag substring of `key`, or `key` itself if there is no
/// balanced, non-empty `{...}` tag. Only the first `{` is considered.
fn hash_tag(key: &[u8]) -> &[u8] {
    let open = match key.iter().position(|&b| b == b'{') {
        Some(open) => open,
        None => return key,
    };
    let after_open = open + 1;
    match key[after_open..].iter().position(|&b| b == b'}') {
        Some(0) | None => key,
        Some(close_offset) => &key[after_open..after_open + close_offset],
    }
}
