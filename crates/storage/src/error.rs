// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error taxonomy

use crate::config::ConfigError;
use crate::snapshot::SnapshotError;
use crate::wal::WalReadError;
use fxd_core::{CodecError, GraphError, NodeId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`crate::Store`] operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corrupt encoding in {location}: {source}")]
    CorruptEncoding {
        location: String,
        #[source]
        source: CodecError,
    },
    #[error("checksum mismatch in {location}")]
    ChecksumMismatch { location: String },
    #[error("cycle detected among nodes: {}", join_ids(.nodes))]
    CycleDetected { nodes: Vec<NodeId> },
    #[error("store is locked by another writer: {}", .path.display())]
    AlreadyLocked { path: PathBuf },
    #[error("IO error: {0}")]
    IoFailure(#[from] std::io::Error),
    #[error("snapshot error: {0}")]
    Snapshot(SnapshotError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("store is closed")]
    Closed,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoreError {
    pub(crate) fn corrupt(location: impl Into<String>, source: CodecError) -> Self {
        StoreError::CorruptEncoding {
            location: location.into(),
            source,
        }
    }
}

impl From<SnapshotError> for StoreError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::ChecksumMismatch { table, key } => StoreError::ChecksumMismatch {
                location: format!("{table} row {key}"),
            },
            SnapshotError::Codec { table, key, source } => {
                StoreError::corrupt(format!("{table} row {key}"), source)
            }
            SnapshotError::Io(e) => StoreError::IoFailure(e),
            other => StoreError::Snapshot(other),
        }
    }
}

impl From<WalReadError> for StoreError {
    fn from(e: WalReadError) -> Self {
        match e {
            WalReadError::Io(e) => StoreError::IoFailure(e),
            WalReadError::ChecksumMismatch { offset } => StoreError::ChecksumMismatch {
                location: format!("wal record at offset {offset}"),
            },
            WalReadError::Payload { offset, source } => {
                StoreError::corrupt(format!("wal record at offset {offset}"), source)
            }
            other => StoreError::corrupt(
                "wal",
                CodecError::InvalidValue(other.to_string()),
            ),
        }
    }
}
