// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL reader for iterating and validating records
//!
//! Iteration stops at the first record that is short, fails its checksum,
//! breaks the sequence chain or carries an undecodable payload. Everything
//! before that point is the durable log; everything after is discarded by
//! repair.

use super::operation::Operation;
use super::record::{Opcode, WalRecord, MAGIC, RECORD_HEADER_LEN, RECORD_TRAILER_LEN};
use fxd_core::CodecError;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalReadError {
    #[error("file is not an fxd WAL (bad header)")]
    BadMagic,
    #[error("truncated record at offset {offset}")]
    Truncated { offset: u64 },
    #[error("checksum mismatch for record at offset {offset}")]
    ChecksumMismatch { offset: u64 },
    #[error("sequence gap at offset {offset}: expected {expected}, found {found}")]
    SequenceGap {
        offset: u64,
        expected: u64,
        found: u64,
    },
    #[error("unknown opcode {opcode} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u64 },
    #[error("undecodable payload at offset {offset}: {source}")]
    Payload {
        offset: u64,
        #[source]
        source: CodecError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WalReadError {
    /// Offset of the offending record, when the error is about one
    pub fn offset(&self) -> Option<u64> {
        match self {
            WalReadError::Truncated { offset }
            | WalReadError::ChecksumMismatch { offset }
            | WalReadError::SequenceGap { offset, .. }
            | WalReadError::UnknownOpcode { offset, .. }
            | WalReadError::Payload { offset, .. } => Some(*offset),
            WalReadError::BadMagic => Some(0),
            WalReadError::Io(_) => None,
        }
    }
}

/// A verified record with its decoded operation
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    pub sequence: u64,
    pub operation: Operation,
    /// Byte offset of the record in the file
    pub offset: u64,
}

/// WAL reader for iterating over records
pub struct WalReader {
    path: PathBuf,
}

impl WalReader {
    /// A missing file reads as an empty log
    pub fn open_or_empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn entries(&self) -> Result<WalEntryIter, WalReadError> {
        WalEntryIter::new(&self.path, 0, None)
    }

    /// Entries with sequence >= `sequence`
    pub fn entries_from(&self, sequence: u64) -> Result<WalEntryIter, WalReadError> {
        WalEntryIter::new(&self.path, sequence, None)
    }

    /// Entries from `sequence`, reading no further than byte `end`
    pub fn entries_between(&self, sequence: u64, end: u64) -> Result<WalEntryIter, WalReadError> {
        WalEntryIter::new(&self.path, sequence, Some(end))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the whole log without modifying it
    pub fn validate(&self) -> Result<WalValidation, WalReadError> {
        let mut iter = self.entries()?;
        let mut valid_records = 0u64;
        let mut last_valid_sequence = None;
        let mut corruption = None;

        while let Some(entry) = iter.next() {
            match entry {
                Ok(entry) => {
                    valid_records += 1;
                    last_valid_sequence = Some(entry.sequence);
                }
                Err(WalReadError::Io(e)) => return Err(WalReadError::Io(e)),
                Err(e) => {
                    corruption = Some(WalCorruption {
                        offset: e.offset().unwrap_or(iter.last_valid_position()),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(WalValidation {
            valid_records,
            last_valid_sequence,
            last_valid_position: iter.last_valid_position(),
            file_len: iter.file_len(),
            corruption,
        })
    }
}

/// Validation result for a WAL file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalValidation {
    pub valid_records: u64,
    pub last_valid_sequence: Option<u64>,
    /// Byte offset just past the last valid record
    pub last_valid_position: u64,
    pub file_len: u64,
    pub corruption: Option<WalCorruption>,
}

impl WalValidation {
    /// Bytes after the last valid record
    pub fn invalid_tail(&self) -> u64 {
        self.file_len.saturating_sub(self.last_valid_position)
    }
}

/// First corruption found in a WAL file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalCorruption {
    pub offset: u64,
    pub reason: String,
}

/// Iterator over WAL entries with position tracking
pub struct WalEntryIter {
    reader: Option<BufReader<File>>,
    pending: Option<WalReadError>,
    skip_until_sequence: u64,
    expected_sequence: Option<u64>,
    /// Position after the last successfully read and validated record
    last_valid_position: u64,
    position: u64,
    end: u64,
    file_len: u64,
}

impl WalEntryIter {
    fn new(path: &Path, skip_until_sequence: u64, end: Option<u64>) -> Result<Self, WalReadError> {
        let mut iter = Self {
            reader: None,
            pending: None,
            skip_until_sequence,
            expected_sequence: None,
            last_valid_position: 0,
            position: 0,
            end: 0,
            file_len: 0,
        };

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(iter),
            Err(e) => return Err(e.into()),
        };
        iter.file_len = file.metadata()?.len();

        // Shorter than the header: an interrupted create, read as empty
        if iter.file_len < MAGIC.len() as u64 {
            return Ok(iter);
        }

        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            iter.pending = Some(WalReadError::BadMagic);
            return Ok(iter);
        }

        iter.position = MAGIC.len() as u64;
        iter.last_valid_position = iter.position;
        iter.end = end.map_or(iter.file_len, |end| end.min(iter.file_len));
        iter.reader = Some(reader);
        Ok(iter)
    }

    pub fn last_valid_position(&self) -> u64 {
        self.last_valid_position
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    fn read_record(&mut self) -> Option<Result<WalEntry, WalReadError>> {
        let reader = self.reader.as_mut()?;
        let offset = self.position;
        let remaining = self.end.saturating_sub(offset);
        if remaining == 0 {
            return None;
        }
        if remaining < (RECORD_HEADER_LEN + RECORD_TRAILER_LEN) as u64 {
            return Some(Err(WalReadError::Truncated { offset }));
        }

        let mut header = [0u8; RECORD_HEADER_LEN];
        if let Err(e) = reader.read_exact(&mut header) {
            return Some(Err(e.into()));
        }
        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&header[0..8]);
        let sequence = u64::from_le_bytes(seq_bytes);
        let opcode_byte = header[8];
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[9..13]);
        let payload_len = u32::from_le_bytes(len_bytes) as u64;

        let total = (RECORD_HEADER_LEN + RECORD_TRAILER_LEN) as u64 + payload_len;
        if remaining < total {
            return Some(Err(WalReadError::Truncated { offset }));
        }

        let mut payload = vec![0u8; payload_len as usize];
        let mut checksum_bytes = [0u8; 8];
        if let Err(e) = reader
            .read_exact(&mut payload)
            .and_then(|()| reader.read_exact(&mut checksum_bytes))
        {
            return Some(Err(e.into()));
        }
        let checksum = u64::from_le_bytes(checksum_bytes);

        if checksum != fxd_core::checksum::record_checksum(sequence, opcode_byte, &payload) {
            return Some(Err(WalReadError::ChecksumMismatch { offset }));
        }
        if let Some(expected) = self.expected_sequence {
            if sequence != expected {
                return Some(Err(WalReadError::SequenceGap {
                    offset,
                    expected,
                    found: sequence,
                }));
            }
        }
        let Some(opcode) = Opcode::from_byte(opcode_byte) else {
            return Some(Err(WalReadError::UnknownOpcode {
                opcode: opcode_byte,
                offset,
            }));
        };
        let record = WalRecord {
            sequence,
            opcode,
            payload,
            checksum,
        };
        let operation = match Operation::decode(record.opcode, &record.payload) {
            Ok(op) => op,
            Err(source) => return Some(Err(WalReadError::Payload { offset, source })),
        };

        self.position = offset + total;
        self.last_valid_position = self.position;
        self.expected_sequence = Some(sequence + 1);
        Some(Ok(WalEntry {
            sequence,
            operation,
            offset,
        }))
    }
}

impl Iterator for WalEntryIter {
    type Item = Result<WalEntry, WalReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            self.reader = None;
            return Some(Err(e));
        }
        loop {
            match self.read_record()? {
                Ok(entry) if entry.sequence < self.skip_until_sequence => continue,
                Ok(entry) => return Some(Ok(entry)),
                Err(e) => {
                    // Nothing past the first bad record is trusted
                    self.reader = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
