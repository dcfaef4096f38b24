// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row conversions
//!
//! u64 checksums, sequences and timestamps are stored as their i64 bit
//! pattern, since SQLite integers are signed.

use super::SnapshotError;
use fxd_core::codec::{self, CodecError};
use fxd_core::{checksum, Node, NodeId, NodeKind, Snippet};
use rusqlite::Row;

/// A `nodes` row as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub key: String,
    pub kind: String,
    pub value_bytes: Vec<u8>,
    pub prototypes_bytes: Vec<u8>,
    pub metadata_bytes: Vec<u8>,
    pub checksum: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// Every `nodes` column but the key, for change detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StoredNode {
    parent_id: Option<String>,
    key: String,
    kind: String,
    value_bytes: Vec<u8>,
    prototypes_bytes: Vec<u8>,
    metadata_bytes: Vec<u8>,
    checksum: i64,
    created_at: i64,
    modified_at: i64,
}

impl NodeRow {
    pub fn from_node(node: &Node) -> Self {
        Self {
            id: node.id.0.clone(),
            parent_id: node.parent_id.as_ref().map(|p| p.0.clone()),
            key: node.key.clone(),
            kind: node.kind.as_str().to_string(),
            value_bytes: node.value_bytes(),
            prototypes_bytes: node.prototypes_bytes(),
            metadata_bytes: node.metadata_bytes(),
            checksum: node.checksum as i64,
            created_at: node.created_at_micros as i64,
            modified_at: node.modified_at_micros as i64,
        }
    }

    /// Columns in `SELECT id, parent_id, key, kind, value_bytes,
    /// prototypes_bytes, metadata_bytes, checksum, created_at, modified_at`
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            key: row.get(2)?,
            kind: row.get(3)?,
            value_bytes: row.get(4)?,
            prototypes_bytes: row.get(5)?,
            metadata_bytes: row.get(6)?,
            checksum: row.get(7)?,
            created_at: row.get(8)?,
            modified_at: row.get(9)?,
        })
    }

    pub(super) fn stored(&self) -> StoredNode {
        StoredNode {
            parent_id: self.parent_id.clone(),
            key: self.key.clone(),
            kind: self.kind.clone(),
            value_bytes: self.value_bytes.clone(),
            prototypes_bytes: self.prototypes_bytes.clone(),
            metadata_bytes: self.metadata_bytes.clone(),
            checksum: self.checksum,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }

    /// Columns in `SELECT parent_id, key, kind, value_bytes, prototypes_bytes,
    /// metadata_bytes, checksum, created_at, modified_at`
    pub(super) fn stored_part(row: &Row<'_>) -> rusqlite::Result<StoredNode> {
        Ok(StoredNode {
            parent_id: row.get(0)?,
            key: row.get(1)?,
            kind: row.get(2)?,
            value_bytes: row.get(3)?,
            prototypes_bytes: row.get(4)?,
            metadata_bytes: row.get(5)?,
            checksum: row.get(6)?,
            created_at: row.get(7)?,
            modified_at: row.get(8)?,
        })
    }

    /// Verify the checksum, then decode into a clean node
    pub fn into_node(self) -> Result<Node, SnapshotError> {
        let expected = checksum::node_checksum(&self.value_bytes, &self.metadata_bytes);
        if expected != self.checksum as u64 {
            return Err(SnapshotError::ChecksumMismatch {
                table: "nodes",
                key: self.id,
            });
        }

        let corrupt = |id: &str, source: CodecError| SnapshotError::Codec {
            table: "nodes",
            key: id.to_string(),
            source,
        };
        let value = codec::decode(&self.value_bytes).map_err(|e| corrupt(&self.id, e))?;
        let metadata = codec::decode(&self.metadata_bytes).map_err(|e| corrupt(&self.id, e))?;
        let prototypes = codec::decode(&self.prototypes_bytes).map_err(|e| corrupt(&self.id, e))?;

        Ok(Node {
            id: NodeId(self.id),
            parent_id: self.parent_id.map(NodeId),
            key: self.key,
            kind: NodeKind::parse(&self.kind),
            value,
            prototypes,
            metadata,
            checksum: expected,
            created_at_micros: self.created_at as u64,
            modified_at_micros: self.modified_at as u64,
            dirty: false,
        })
    }
}

/// Columns in `SELECT snippet_id, node_id, body, language, virtual_file_path,
/// order_index, version, checksum`
pub(super) fn snippet_from_row(row: &Row<'_>) -> rusqlite::Result<Snippet> {
    Ok(Snippet {
        snippet_id: row.get(0)?,
        node_id: NodeId(row.get(1)?),
        body: row.get(2)?,
        language: row.get(3)?,
        virtual_file_path: row.get(4)?,
        order_index: row.get(5)?,
        version: row.get::<_, i64>(6)? as u64,
        checksum: row.get::<_, i64>(7)? as u64,
    })
}
