// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot schema and connection setup

use rusqlite::{params, Connection, OptionalExtension};

use super::SnapshotError;

pub const SCHEMA_VERSION: i64 = 1;

// No foreign key on nodes.parent_id: dangling parents must stay loadable so
// the reconstructor can recover them as orphans.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id               TEXT PRIMARY KEY,
    parent_id        TEXT,
    key              TEXT NOT NULL,
    kind             TEXT NOT NULL,
    value_bytes      BLOB NOT NULL,
    prototypes_bytes BLOB NOT NULL,
    metadata_bytes   BLOB NOT NULL,
    checksum         INTEGER NOT NULL,
    created_at       INTEGER NOT NULL,
    modified_at      INTEGER NOT NULL,
    dirty            INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);

CREATE TABLE IF NOT EXISTS snippets (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id           TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    snippet_id        TEXT NOT NULL UNIQUE,
    body              TEXT NOT NULL,
    language          TEXT NOT NULL,
    virtual_file_path TEXT NOT NULL,
    order_index       INTEGER NOT NULL,
    version           INTEGER NOT NULL,
    checksum          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snippets_node ON snippets(node_id);

CREATE TABLE IF NOT EXISTS snippet_tombstones (
    snippet_id TEXT PRIMARY KEY,
    version    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS signals (
    sequence  INTEGER PRIMARY KEY,
    stream_id TEXT NOT NULL,
    payload   BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    checksum  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_signals_stream ON signals(stream_id, sequence);

CREATE TABLE IF NOT EXISTS store_meta (
    singleton             INTEGER PRIMARY KEY CHECK (singleton = 1),
    last_applied_sequence INTEGER NOT NULL DEFAULT 0,
    schema_version        INTEGER NOT NULL
);
";

/// Open (or create) a snapshot database and bring its schema up to date
pub fn open_database(path: &std::path::Path) -> Result<Connection, SnapshotError> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// In-memory snapshot database for tests
pub fn open_in_memory() -> Result<Connection, SnapshotError> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<(), SnapshotError> {
    // Checkpoint commits must be durable before the WAL is pruned
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;

    let found: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM store_meta WHERE singleton = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        None => {
            conn.execute(
                "INSERT INTO store_meta (singleton, last_applied_sequence, schema_version) VALUES (1, 0, ?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(found) => {
            return Err(SnapshotError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            })
        }
    }
    Ok(())
}
