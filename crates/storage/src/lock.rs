// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive-open guard for a store
//!
//! An advisory `fs2` lock on `<store>.lock`, held for the lifetime of the
//! store handle. The file carries the owner's pid for diagnostics and is
//! never removed: unlinking it would let a waiter on the old inode and a
//! newcomer on a fresh file both hold the lock.

use crate::error::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    file: File,
}

impl StoreLock {
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Don't truncate before locking: the pid belongs to the current holder
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(StoreError::AlreadyLocked {
                    path: path.to_path_buf(),
                });
            }
            return Err(StoreError::IoFailure(e));
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;
        tracing::debug!(path = %path.display(), "store lock acquired");

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(?e, "failed to release store lock");
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
