// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL record framing
//!
//! ```text
//! sequence: u64 LE | opcode: u8 | payload_len: u32 LE | payload | checksum: u64 LE
//! ```
//!
//! The checksum is xxh3 over everything before it, so a torn write anywhere
//! in the record (including its length) fails verification.

use fxd_core::checksum;

/// File header identifying an fxd WAL
pub const MAGIC: &[u8; 8] = b"FXDWAL01";

/// Bytes before the payload
pub const RECORD_HEADER_LEN: usize = 8 + 1 + 4;

/// Bytes after the payload
pub const RECORD_TRAILER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    PutNode = 1,
    UpdateValue = 2,
    DeleteNode = 3,
    PutSnippet = 4,
    EmitSignal = 5,
    CheckpointMarker = 6,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => Opcode::PutNode,
            2 => Opcode::UpdateValue,
            3 => Opcode::DeleteNode,
            4 => Opcode::PutSnippet,
            5 => Opcode::EmitSignal,
            6 => Opcode::CheckpointMarker,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::PutNode => "put-node",
            Opcode::UpdateValue => "update-value",
            Opcode::DeleteNode => "delete-node",
            Opcode::PutSnippet => "put-snippet",
            Opcode::EmitSignal => "emit-signal",
            Opcode::CheckpointMarker => "checkpoint-marker",
        }
    }
}

/// One framed record as it sits on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub sequence: u64,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub checksum: u64,
}

impl WalRecord {
    pub fn new(sequence: u64, opcode: Opcode, payload: Vec<u8>) -> Self {
        let checksum = checksum::record_checksum(sequence, opcode as u8, &payload);
        Self {
            sequence,
            opcode,
            payload,
            checksum,
        }
    }

    pub fn verify(&self) -> bool {
        self.checksum == checksum::record_checksum(self.sequence, self.opcode as u8, &self.payload)
    }

    /// Size of the record on disk
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.payload.len() + RECORD_TRAILER_LEN
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.push(self.opcode as u8);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
