//! Test helpers for behavioral specifications.
//!
//! `TempStore` owns a scratch directory holding one store. Every open gets
//! a fresh id prefix so nodes created after a reopen never collide with
//! ids issued before it.

pub use fxd_core::{Graph, NewNode, NewSnippet, NodeId, NodeKind, Value};
pub use fxd_storage::{RecoveryNote, Store, StoreConfig, StoreError, StoreOptions};

use fxd_core::{FakeClock, SequentialIdGen};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TempStore {
    _dir: TempDir,
    path: PathBuf,
    opens: Cell<u32>,
}

impl TempStore {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.fxd");
        Self {
            _dir: dir,
            path,
            opens: Cell::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn wal_path(&self) -> PathBuf {
        fxd_storage::StorePaths::new(&self.path).wal
    }

    fn options(&self) -> StoreOptions {
        let n = self.opens.get() + 1;
        self.opens.set(n);
        StoreOptions::default()
            .with_clock(FakeClock::new())
            .with_ids(SequentialIdGen::new(format!("g{n}")))
            .with_config(StoreConfig {
                sync_writes: false,
                ..StoreConfig::default()
            })
    }

    pub fn create(&self) -> Store {
        Store::create_with(&self.path, self.options()).unwrap()
    }

    pub fn open(&self) -> Store {
        self.try_open().unwrap()
    }

    pub fn try_open(&self) -> Result<Store, StoreError> {
        Store::open_with(&self.path, self.options())
    }

    /// Raw connection to the snapshot, for tampering while the store is closed
    pub fn snapshot_db(&self) -> rusqlite::Connection {
        rusqlite::Connection::open(&self.path).unwrap()
    }
}

pub fn node_id(store: &Store, path: &str) -> NodeId {
    store
        .resolve(path)
        .unwrap()
        .unwrap_or_else(|| panic!("no node at {path}"))
        .id
}

pub fn value_at(store: &Store, path: &str) -> Option<Value> {
    store.resolve(path).unwrap().map(|node| node.value)
}
