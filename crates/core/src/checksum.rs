// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! 64-bit xxh3 digests for log records, nodes, snippets and signals
//!
//! Variable-length inputs are length-prefixed before hashing so that moving
//! bytes between adjacent fields always changes the digest.

use xxhash_rust::xxh3::Xxh3;

/// WAL record digest over the framed header fields and payload
pub fn record_checksum(sequence: u64, opcode: u8, payload: &[u8]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&sequence.to_le_bytes());
    hasher.update(&[opcode]);
    hasher.update(&(payload.len() as u32).to_le_bytes());
    hasher.update(payload);
    hasher.digest()
}

/// Node digest over encoded value and metadata
pub fn node_checksum(value_bytes: &[u8], metadata_bytes: &[u8]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&(value_bytes.len() as u32).to_le_bytes());
    hasher.update(value_bytes);
    hasher.update(metadata_bytes);
    hasher.digest()
}

/// Snippet digest over body, language, virtual path and order index
pub fn snippet_checksum(body: &str, language: &str, virtual_file_path: &str, order_index: i64) -> u64 {
    let mut hasher = Xxh3::new();
    for field in [body, language, virtual_file_path] {
        hasher.update(&(field.len() as u32).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update(&order_index.to_le_bytes());
    hasher.digest()
}

/// Signal digest over stream id, encoded payload and timestamp
pub fn signal_checksum(stream_id: &str, payload_bytes: &[u8], timestamp_micros: u64) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&(stream_id.len() as u32).to_le_bytes());
    hasher.update(stream_id.as_bytes());
    hasher.update(&(payload_bytes.len() as u32).to_le_bytes());
    hasher.update(payload_bytes);
    hasher.update(&timestamp_micros.to_le_bytes());
    hasher.digest()
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod tests;
