// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL writer for durable append operations
//!
//! An append either lands completely (and is synced when `sync` is set)
//! or is rolled back to the previous end of the log; the sequence counter
//! only advances on success.

use super::operation::Operation;
use super::reader::{WalReadError, WalReader};
use super::record::{WalRecord, MAGIC};
use crate::error::StoreError;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct WalWriter {
    path: PathBuf,
    file: File,
    next_sequence: u64,
    /// End of the last complete record
    position: u64,
    sync: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Scans existing records to find the end of the log. Sequences resume
    /// after the last record, but never below `floor_sequence`, so a freshly
    /// compacted log continues the numbering of the one it replaced.
    pub fn open(path: &Path, floor_sequence: u64, sync: bool) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let validation = match WalReader::open_or_empty(path).validate() {
            Ok(v) => v,
            Err(WalReadError::Io(e)) => return Err(StoreError::IoFailure(e)),
            Err(e) => return Err(e.into()),
        };
        if let Some(corruption) = &validation.corruption {
            if validation.last_valid_position == 0 {
                return Err(StoreError::from(WalReadError::BadMagic));
            }
            tracing::warn!(
                offset = corruption.offset,
                reason = %corruption.reason,
                "appending after last valid WAL record"
            );
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let position = if validation.last_valid_position < MAGIC.len() as u64 {
            file.set_len(0)?;
            file.write_all(MAGIC)?;
            file.sync_all()?;
            MAGIC.len() as u64
        } else {
            if validation.invalid_tail() > 0 {
                file.set_len(validation.last_valid_position)?;
                file.sync_all()?;
            }
            validation.last_valid_position
        };

        let next_sequence = validation
            .last_valid_sequence
            .map_or(floor_sequence, |last| (last + 1).max(floor_sequence))
            .max(1);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_sequence,
            position,
            sync,
        })
    }

    /// Append an operation, returning its sequence
    pub fn append(&mut self, operation: &Operation) -> Result<u64, StoreError> {
        let record = WalRecord::new(
            self.next_sequence,
            operation.opcode(),
            operation.encode_payload(),
        );
        let bytes = record.to_bytes();

        if let Err(e) = self.write_at_end(&bytes) {
            // Drop whatever part of the record reached the file
            if let Err(rollback) = self.file.set_len(self.position) {
                tracing::error!(?rollback, position = self.position, "WAL rollback failed");
            }
            return Err(e.into());
        }

        self.position += bytes.len() as u64;
        self.next_sequence += 1;
        Ok(record.sequence)
    }

    fn write_at_end(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.write_all(bytes)?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Sequence the next append will get
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Byte offset just past the last complete record
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
