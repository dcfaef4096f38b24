// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite snapshot store
//!
//! The snapshot is the checkpoint base: flat node, snippet and signal rows
//! plus the WAL sequence already folded in. Every checkpoint is one
//! transaction, so a crash leaves either the old or the new snapshot.

mod rows;
pub mod schema;

pub use rows::NodeRow;

use fxd_core::codec::{self, CodecError};
use fxd_core::{Node, NodeId, Signal, Snippet};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("checksum mismatch in {table} row {key}")]
    ChecksumMismatch { table: &'static str, key: String },
    #[error("corrupt {table} row {key}: {source}")]
    Codec {
        table: &'static str,
        key: String,
        #[source]
        source: CodecError,
    },
    #[error("unsupported schema version {found} (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rows to fold into the snapshot in one checkpoint
#[derive(Debug, Default)]
pub struct CheckpointBatch<'a> {
    pub nodes: Vec<&'a Node>,
    pub removed_nodes: Vec<NodeId>,
    pub snippets: Vec<&'a Snippet>,
    /// Removed snippet ids with their last version, kept as tombstones
    pub removed_snippets: Vec<(String, u64)>,
    pub signals: Vec<Signal>,
    pub last_applied_sequence: u64,
}

/// What a checkpoint actually wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub nodes_written: usize,
    pub nodes_unchanged: usize,
    pub nodes_deleted: usize,
    pub snippets_written: usize,
    pub snippets_deleted: usize,
    pub signals_written: usize,
}

/// Row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub nodes: u64,
    pub snippets: u64,
    pub signals: u64,
}

pub struct SnapshotStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            conn: schema::open_database(path)?,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> Result<Self, SnapshotError> {
        Ok(Self {
            conn: schema::open_in_memory()?,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// WAL sequence already folded into this snapshot; 0 when none
    pub fn last_applied_sequence(&self) -> Result<u64, SnapshotError> {
        let seq: i64 = self.conn.query_row(
            "SELECT last_applied_sequence FROM store_meta WHERE singleton = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(seq as u64)
    }

    /// All node rows, checksums verified
    pub fn load_nodes(&self) -> Result<Vec<Node>, SnapshotError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, parent_id, key, kind, value_bytes, prototypes_bytes, metadata_bytes,
                    checksum, created_at, modified_at
             FROM nodes ORDER BY id",
        )?;
        let rows = stmt.query_map([], NodeRow::from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?.into_node()?);
        }
        Ok(nodes)
    }

    /// All snippet rows, checksums verified
    pub fn load_snippets(&self) -> Result<Vec<Snippet>, SnapshotError> {
        let mut stmt = self.conn.prepare(
            "SELECT snippet_id, node_id, body, language, virtual_file_path, order_index, version, checksum
             FROM snippets ORDER BY order_index, snippet_id",
        )?;
        let rows = stmt.query_map([], rows::snippet_from_row)?;
        let mut snippets = Vec::new();
        for row in rows {
            let snippet = row?;
            if !snippet.verify() {
                return Err(SnapshotError::ChecksumMismatch {
                    table: "snippets",
                    key: snippet.snippet_id,
                });
            }
            snippets.push(snippet);
        }
        Ok(snippets)
    }

    /// Last version of every snippet id that was ever removed
    pub fn load_snippet_tombstones(&self) -> Result<Vec<(String, u64)>, SnapshotError> {
        let mut stmt = self
            .conn
            .prepare("SELECT snippet_id, version FROM snippet_tombstones ORDER BY snippet_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn counts(&self) -> Result<SnapshotCounts, SnapshotError> {
        let count = |table: &str| -> Result<u64, SnapshotError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(n as u64)
        };
        Ok(SnapshotCounts {
            nodes: count("nodes")?,
            snippets: count("snippets")?,
            signals: count("signals")?,
        })
    }

    /// Up to `limit` signals on `stream_id` with `from <= sequence < before`
    pub fn signals_page(
        &self,
        stream_id: &str,
        from: u64,
        before: u64,
        limit: usize,
    ) -> Result<Vec<Signal>, SnapshotError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT sequence, payload, timestamp, checksum FROM signals
             WHERE stream_id = ?1 AND sequence >= ?2 AND sequence < ?3
             ORDER BY sequence LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![stream_id, from as i64, before as i64, limit as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, i64>(2)? as u64,
                    row.get::<_, i64>(3)? as u64,
                ))
            },
        )?;

        let mut signals = Vec::new();
        for row in rows {
            let (sequence, payload_bytes, timestamp_micros, checksum) = row?;
            let key = sequence.to_string();
            if checksum
                != fxd_core::checksum::signal_checksum(stream_id, &payload_bytes, timestamp_micros)
            {
                return Err(SnapshotError::ChecksumMismatch {
                    table: "signals",
                    key,
                });
            }
            let payload = codec::decode(&payload_bytes).map_err(|source| SnapshotError::Codec {
                table: "signals",
                key,
                source,
            })?;
            signals.push(Signal {
                stream_id: stream_id.to_string(),
                sequence,
                payload,
                timestamp_micros,
            });
        }
        Ok(signals)
    }

    /// Fold a batch of changes in a single transaction
    pub fn write_checkpoint(
        &mut self,
        batch: &CheckpointBatch<'_>,
    ) -> Result<CheckpointSummary, SnapshotError> {
        let mut summary = CheckpointSummary::default();
        let tx = self.conn.transaction()?;

        {
            let mut delete = tx.prepare_cached("DELETE FROM nodes WHERE id = ?1")?;
            for id in &batch.removed_nodes {
                summary.nodes_deleted += delete.execute(params![id.as_str()])?;
            }
        }

        {
            let mut existing = tx.prepare_cached(
                "SELECT parent_id, key, kind, value_bytes, prototypes_bytes, metadata_bytes,
                        checksum, created_at, modified_at
                 FROM nodes WHERE id = ?1",
            )?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO nodes (id, parent_id, key, kind, value_bytes, prototypes_bytes,
                                    metadata_bytes, checksum, created_at, modified_at, dirty)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)
                 ON CONFLICT(id) DO UPDATE SET
                    parent_id = excluded.parent_id,
                    key = excluded.key,
                    kind = excluded.kind,
                    value_bytes = excluded.value_bytes,
                    prototypes_bytes = excluded.prototypes_bytes,
                    metadata_bytes = excluded.metadata_bytes,
                    checksum = excluded.checksum,
                    created_at = excluded.created_at,
                    modified_at = excluded.modified_at,
                    dirty = 0",
            )?;
            for node in &batch.nodes {
                let row = NodeRow::from_node(node);
                let stored = existing
                    .query_row(params![row.id], NodeRow::stored_part)
                    .optional()?;
                if stored.as_ref() == Some(&row.stored()) {
                    summary.nodes_unchanged += 1;
                    continue;
                }
                upsert.execute(params![
                    row.id,
                    row.parent_id,
                    row.key,
                    row.kind,
                    row.value_bytes,
                    row.prototypes_bytes,
                    row.metadata_bytes,
                    row.checksum,
                    row.created_at,
                    row.modified_at,
                ])?;
                summary.nodes_written += 1;
            }
        }

        {
            let mut delete = tx.prepare_cached("DELETE FROM snippets WHERE snippet_id = ?1")?;
            let mut tombstone = tx.prepare_cached(
                "INSERT INTO snippet_tombstones (snippet_id, version) VALUES (?1, ?2)
                 ON CONFLICT(snippet_id) DO UPDATE SET
                    version = max(version, excluded.version)",
            )?;
            for (snippet_id, version) in &batch.removed_snippets {
                summary.snippets_deleted += delete.execute(params![snippet_id])?;
                tombstone.execute(params![snippet_id, *version as i64])?;
            }
            let mut upsert = tx.prepare_cached(
                "INSERT INTO snippets (node_id, snippet_id, body, language, virtual_file_path,
                                       order_index, version, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(snippet_id) DO UPDATE SET
                    node_id = excluded.node_id,
                    body = excluded.body,
                    language = excluded.language,
                    virtual_file_path = excluded.virtual_file_path,
                    order_index = excluded.order_index,
                    version = excluded.version,
                    checksum = excluded.checksum",
            )?;
            for snippet in &batch.snippets {
                upsert.execute(params![
                    snippet.node_id.as_str(),
                    snippet.snippet_id,
                    snippet.body,
                    snippet.language,
                    snippet.virtual_file_path,
                    snippet.order_index,
                    snippet.version as i64,
                    snippet.checksum as i64,
                ])?;
                summary.snippets_written += 1;
            }
        }

        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO signals (sequence, stream_id, payload, timestamp, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for signal in &batch.signals {
                let payload = codec::encode(&signal.payload);
                summary.signals_written += insert.execute(params![
                    signal.sequence as i64,
                    signal.stream_id,
                    payload,
                    signal.timestamp_micros as i64,
                    signal.checksum() as i64,
                ])?;
            }
        }

        tx.execute(
            "UPDATE store_meta SET last_applied_sequence = ?1 WHERE singleton = 1",
            params![batch.last_applied_sequence as i64],
        )?;
        tx.commit()?;
        Ok(summary)
    }

    /// Raw access for maintenance and tests
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
