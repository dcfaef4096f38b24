// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence engine
//!
//! A store is two cooperating files: a SQLite snapshot and a WAL holding
//! everything applied since. `Store` owns both, plus the live graph, behind
//! one reader-writer lock. Mutations are validated against the graph,
//! appended to the WAL, and only then applied. A checkpoint folds the graph
//! into the snapshot and compacts the WAL only after the snapshot commit is
//! durable.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::lock::StoreLock;
use crate::reconstruct::{reconstruct, Reconstruction};
use crate::recovery::RecoveryNote;
use crate::signals::{SignalBus, Subscription};
use crate::snapshot::{CheckpointBatch, CheckpointSummary, SnapshotStore};
use crate::wal::{
    Opcode, Operation, WalReadError, WalReader, WalRecord, WalValidation, WalWriter, MAGIC,
};
use fxd_core::graph::split_path;
use fxd_core::{
    Clock, Graph, GraphError, IdGen, Metadata, NewNode, NewSnippet, Node, NodeId, NodeKind, Signal,
    Snippet, SystemClock, UuidIdGen, Value,
};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

/// Files making up one logical store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub snapshot: PathBuf,
    pub wal: PathBuf,
    pub lock: PathBuf,
}

impl StorePaths {
    /// `path` names the snapshot; the WAL and lock file sit beside it
    pub fn new(path: &Path) -> Self {
        Self {
            snapshot: path.to_path_buf(),
            wal: with_suffix(path, ".wal"),
            lock: with_suffix(path, ".lock"),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Collaborators a store is built with
#[derive(Clone)]
pub struct StoreOptions {
    pub config: StoreConfig,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGen>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            config: StoreConfig::default(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGen),
        }
    }
}

impl StoreOptions {
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_ids(mut self, ids: impl IdGen + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub node_count: u64,
    pub snippet_count: u64,
    pub signal_count: u64,
}

/// Published for every WAL append except checkpoint markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEvent {
    pub sequence: u64,
    pub kind: Opcode,
}

/// Result of compacting the WAL after a checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionResult {
    pub entries_removed: usize,
    pub entries_kept: usize,
    pub bytes_reclaimed: u64,
}

/// What a checkpoint did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointReport {
    /// Sequence of the checkpoint marker, now the snapshot's last applied
    pub sequence: u64,
    pub summary: CheckpointSummary,
    pub compaction: CompactionResult,
}

/// Handle to an open store; clones share the same engine
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    paths: StorePaths,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    /// `None` once closed
    engine: RwLock<Option<Engine>>,
    bus: SignalBus,
    lock: Mutex<Option<StoreLock>>,
}

struct Engine {
    graph: Graph,
    wal: WalWriter,
    snapshot: Mutex<SnapshotStore>,
    /// Highest WAL sequence folded into the snapshot
    last_applied: u64,
    /// Signals in the WAL not yet folded into the snapshot
    unfolded_signals: u64,
    ops_since_checkpoint: u64,
    notes: Vec<RecoveryNote>,
    /// Parent cycles found at load, in chain order
    cycles: Vec<Vec<NodeId>>,
    /// Rows cut off by a cycle; left untouched in the snapshot
    detached: Vec<Node>,
    events: Option<mpsc::UnboundedSender<MutationEvent>>,
}

impl Store {
    /// Create a new store; fails if a snapshot already exists at `path`
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        Self::create_with(path, StoreOptions::default())
    }

    pub fn create_with(path: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        options.config.validate()?;
        let paths = StorePaths::new(path);
        if paths.snapshot.exists() {
            return Err(StoreError::AlreadyExists(paths.snapshot));
        }
        let lock = StoreLock::acquire(&paths.lock)?;
        if paths.snapshot.exists() {
            return Err(StoreError::AlreadyExists(paths.snapshot));
        }
        if paths.wal.exists() {
            tracing::warn!(path = %paths.wal.display(), "removing WAL left without a snapshot");
            std::fs::remove_file(&paths.wal)?;
        }
        Self::start(paths, lock, options)
    }

    /// Open an existing store, recovering from the snapshot and WAL
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        options.config.validate()?;
        let paths = StorePaths::new(path);
        if !paths.snapshot.exists() {
            return Err(StoreError::NotFound(format!(
                "store {}",
                paths.snapshot.display()
            )));
        }
        let lock = StoreLock::acquire(&paths.lock)?;
        Self::start(paths, lock, options)
    }

    fn start(paths: StorePaths, lock: StoreLock, options: StoreOptions) -> Result<Self, StoreError> {
        let engine = Engine::load(&paths, &options.config)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                paths,
                config: options.config,
                clock: options.clock,
                ids: options.ids,
                engine: RwLock::new(Some(engine)),
                bus: SignalBus::new(),
                lock: Mutex::new(Some(lock)),
            }),
        })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.inner.paths
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Rebuild the live graph from disk
    ///
    /// Every mutation is already in the WAL, so this loses nothing; it
    /// refreshes the recovery notes and re-verifies the snapshot.
    pub fn load(&self) -> Result<(), StoreError> {
        let mut guard = self.write();
        let current = guard.as_mut().ok_or(StoreError::Closed)?;
        current.wal.sync()?;
        let mut engine = Engine::load(&self.inner.paths, &self.inner.config)?;
        engine.events = current.events.take();
        *guard = Some(engine);
        Ok(())
    }

    /// Checkpoint the live graph into the snapshot
    ///
    /// Returns `None` when the snapshot already reflects every WAL record.
    pub fn save(&self) -> Result<Option<CheckpointReport>, StoreError> {
        let mut guard = self.write();
        let engine = guard.as_mut().ok_or(StoreError::Closed)?;
        engine.checkpoint(&self.inner.paths, &self.inner.config, self.now())
    }

    /// Checkpoint once `checkpoint_interval` operations have accumulated
    pub fn maybe_checkpoint(&self) -> Result<Option<CheckpointReport>, StoreError> {
        let mut guard = self.write();
        let engine = guard.as_mut().ok_or(StoreError::Closed)?;
        if engine.ops_since_checkpoint < self.inner.config.checkpoint_interval {
            return Ok(None);
        }
        engine.checkpoint(&self.inner.paths, &self.inner.config, self.now())
    }

    /// Operations appended since the last checkpoint
    pub fn pending_operations(&self) -> Result<u64, StoreError> {
        let guard = self.read();
        let engine = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(engine.ops_since_checkpoint)
    }

    /// Release files and the store lock; live subscriptions end
    ///
    /// Closing twice is a no-op. Anything not yet checkpointed stays in the
    /// WAL and is replayed by the next open.
    pub fn close(&self) -> Result<(), StoreError> {
        let engine = self.write().take();
        let Some(mut engine) = engine else {
            return Ok(());
        };
        tracing::debug!(
            subscribers = self.inner.bus.subscriber_count(),
            "disconnecting signal subscribers"
        );
        self.inner.bus.close();
        let result = engine.wal.sync();
        drop(engine);
        self.inner
            .lock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        tracing::info!(path = %self.inner.paths.snapshot.display(), "store closed");
        result
    }

    pub fn is_closed(&self) -> bool {
        self.read().is_none()
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let guard = self.read();
        let engine = guard.as_ref().ok_or(StoreError::Closed)?;
        let stored = engine
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .counts()?;
        Ok(StoreStats {
            node_count: engine.graph.len() as u64,
            snippet_count: engine.graph.snippet_count() as u64,
            signal_count: stored.signals + engine.unfolded_signals,
        })
    }

    /// Notes recorded by the most recent load
    pub fn recovery_notes(&self) -> Vec<RecoveryNote> {
        self.read()
            .as_ref()
            .map(|engine| engine.notes.clone())
            .unwrap_or_default()
    }

    /// One `CycleDetected` per parent cycle found by the most recent load
    ///
    /// The rest of the graph loads normally; the cyclic subtrees are kept
    /// out of it and their snapshot rows are never rewritten.
    pub fn cycle_errors(&self) -> Vec<StoreError> {
        self.read()
            .as_ref()
            .map(|engine| {
                engine
                    .cycles
                    .iter()
                    .map(|nodes| StoreError::CycleDetected {
                        nodes: nodes.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes cut off by a parent cycle at the most recent load
    pub fn detached(&self) -> Vec<Node> {
        self.read()
            .as_ref()
            .map(|engine| engine.detached.clone())
            .unwrap_or_default()
    }

    /// Receive an event for every subsequent WAL append
    ///
    /// Only the most recent receiver is fed.
    pub fn mutation_events(&self) -> Result<mpsc::UnboundedReceiver<MutationEvent>, StoreError> {
        let mut guard = self.write();
        let engine = guard.as_mut().ok_or(StoreError::Closed)?;
        let (tx, rx) = mpsc::unbounded_channel();
        engine.events = Some(tx);
        Ok(rx)
    }

    // === Reads ===

    /// Owned copy of the live graph
    pub fn graph(&self) -> Result<Graph, StoreError> {
        self.with_graph(Graph::clone)
    }

    pub fn with_graph<T>(&self, f: impl FnOnce(&Graph) -> T) -> Result<T, StoreError> {
        let guard = self.read();
        let engine = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(f(&engine.graph))
    }

    pub fn get(&self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        self.with_graph(|graph| graph.get(id).cloned())
    }

    pub fn resolve(&self, path: &str) -> Result<Option<Node>, StoreError> {
        self.with_graph(|graph| graph.resolve(path).cloned())
    }

    // === Mutations ===

    /// Create a node with a generated id
    pub fn create_node(
        &self,
        parent: Option<&NodeId>,
        key: &str,
        kind: NodeKind,
        value: impl Into<Value>,
    ) -> Result<NodeId, StoreError> {
        let new = NewNode {
            id: self.inner.ids.next_id(),
            parent_id: parent.cloned(),
            key: key.to_string(),
            kind,
            value: value.into(),
            ..NewNode::default()
        };
        self.insert_node(new)
    }

    /// Create a node with caller-chosen id and fields
    pub fn insert_node(&self, new: NewNode) -> Result<NodeId, StoreError> {
        let now = self.now();
        self.mutate(|engine| engine.insert(new, now))
    }

    pub fn set_value(&self, id: &NodeId, value: impl Into<Value>) -> Result<u64, StoreError> {
        let value = value.into();
        let now = self.now();
        self.mutate(|engine| engine.update_value(id, value, now))
    }

    pub fn set_metadata(&self, id: &NodeId, metadata: Metadata) -> Result<u64, StoreError> {
        let now = self.now();
        self.mutate(|engine| {
            engine.rewrite(id, now, |node| node.metadata = metadata)
        })
    }

    pub fn set_prototypes(&self, id: &NodeId, prototypes: Vec<NodeId>) -> Result<u64, StoreError> {
        let now = self.now();
        self.mutate(|engine| {
            engine.rewrite(id, now, |node| node.prototypes = prototypes)
        })
    }

    /// Delete a node and its subtree, returning the removed ids
    pub fn delete_node(&self, id: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        self.mutate(|engine| engine.delete(id))
    }

    /// Create or update a snippet; `None` when it is unchanged
    pub fn put_snippet(&self, new: NewSnippet) -> Result<Option<Snippet>, StoreError> {
        self.mutate(|engine| {
            let Some(snippet) = engine.graph.prepare_snippet(&new)? else {
                return Ok(None);
            };
            engine.commit(&Operation::PutSnippet(snippet.clone()))?;
            Ok(Some(snippet))
        })
    }

    /// Set the value at a dotted path, creating missing `Object` parents
    pub fn write_path(&self, path: &str, value: impl Into<Value>) -> Result<NodeId, StoreError> {
        let keys = split_path(path)?;
        let value = value.into();
        let now = self.now();
        let ids = Arc::clone(&self.inner.ids);
        self.mutate(|engine| {
            let Some((leaf, parents)) = keys.split_last() else {
                return Err(GraphError::InvalidPath(path.to_string()).into());
            };
            let parent = engine.ensure_objects(parents, ids.as_ref(), now)?;
            match engine.slot(parent.as_ref(), leaf) {
                Some(id) => {
                    engine.update_value(&id, value, now)?;
                    Ok(id)
                }
                None => {
                    let new = NewNode {
                        id: ids.next_id(),
                        parent_id: parent,
                        key: leaf.to_string(),
                        value,
                        ..NewNode::default()
                    };
                    engine.insert(new, now)
                }
            }
        })
    }

    /// Write JSON at a dotted path, decomposed into nodes
    ///
    /// Objects become `Object` nodes with one child per field, arrays become
    /// `Object` nodes keyed "0", "1", ... whose value is the sequence of
    /// child ids, and scalars become `Raw` leaves. Children left over from a
    /// previous write at the same path are deleted.
    pub fn write_json(&self, path: &str, json: &serde_json::Value) -> Result<NodeId, StoreError> {
        let keys = split_path(path)?;
        let now = self.now();
        let ids = Arc::clone(&self.inner.ids);
        self.mutate(|engine| {
            let Some((leaf, parents)) = keys.split_last() else {
                return Err(GraphError::InvalidPath(path.to_string()).into());
            };
            let parent = engine.ensure_objects(parents, ids.as_ref(), now)?;
            engine.write_json_at(parent, leaf, json, ids.as_ref(), now)
        })
    }

    // === Signals ===

    /// Append a signal to the WAL and deliver it to live subscribers
    pub fn emit(&self, stream_id: &str, payload: impl Into<Value>) -> Result<u64, StoreError> {
        let operation = Operation::EmitSignal {
            stream_id: stream_id.to_string(),
            payload: payload.into(),
            timestamp_micros: self.now(),
        };
        self.mutate(|engine| {
            let sequence = engine.commit(&operation)?;
            if let Some(signal) = operation.as_signal(sequence) {
                self.inner.bus.publish(&signal);
            }
            Ok(sequence)
        })
    }

    /// Signals on `stream_id` with sequence >= `from_sequence`, then live
    pub fn subscribe(&self, stream_id: &str, from_sequence: u64) -> Result<Subscription, StoreError> {
        // Register under the engine lock so no emit falls between the
        // history bound and the live receiver
        let guard = self.read();
        let engine = guard.as_ref().ok_or(StoreError::Closed)?;
        let live = self.inner.bus.register(stream_id);
        let live_from = engine.wal.next_sequence();
        drop(guard);

        tracing::debug!(stream_id, from_sequence, live_from, "signal subscription started");
        Ok(Subscription::new(
            self.clone(),
            stream_id.to_string(),
            from_sequence,
            live_from,
            live,
        ))
    }

    /// One page of history: snapshot rows first, then the WAL tail
    pub(crate) fn history_page(
        &self,
        stream_id: &str,
        from: u64,
        before: u64,
    ) -> Result<Vec<Signal>, StoreError> {
        let page_size = self.inner.config.signal_page_size;
        let guard = self.read();
        let engine = guard.as_ref().ok_or(StoreError::Closed)?;

        let stored = engine
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .signals_page(stream_id, from, before, page_size)?;
        if !stored.is_empty() {
            return Ok(stored);
        }

        let mut page = Vec::new();
        let entries = WalReader::open_or_empty(engine.wal.path())
            .entries_between(from, engine.wal.position())?;
        for entry in entries {
            let entry = entry?;
            if entry.sequence >= before {
                break;
            }
            match entry.operation.as_signal(entry.sequence) {
                Some(signal) if signal.stream_id == stream_id => page.push(signal),
                _ => continue,
            }
            if page.len() >= page_size {
                break;
            }
        }
        Ok(page)
    }

    // === Offline maintenance ===

    /// Cut a store's WAL back to its last valid record
    ///
    /// Takes the store lock, so it fails with `AlreadyLocked` while the
    /// store is open. Returns the number of bytes removed.
    pub fn repair_wal(path: &Path) -> Result<u64, StoreError> {
        let paths = StorePaths::new(path);
        let _lock = StoreLock::acquire(&paths.lock)?;
        match truncate_invalid_tail(&paths.wal)? {
            Some(RecoveryNote::WalTruncated {
                discarded_bytes, ..
            }) => Ok(discarded_bytes),
            _ => Ok(0),
        }
    }

    /// Scan a store's WAL without modifying it
    pub fn validate_wal(path: &Path) -> Result<WalValidation, StoreError> {
        let paths = StorePaths::new(path);
        Ok(WalReader::open_or_empty(&paths.wal).validate()?)
    }

    // === Internals ===

    fn now(&self) -> u64 {
        self.inner.clock.now_micros()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Engine>> {
        self.inner.engine.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Engine>> {
        self.inner.engine.write().unwrap_or_else(|e| e.into_inner())
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Engine) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.write();
        let engine = guard.as_mut().ok_or(StoreError::Closed)?;
        f(engine)
    }
}

impl Engine {
    fn load(paths: &StorePaths, config: &StoreConfig) -> Result<Self, StoreError> {
        let snapshot = SnapshotStore::open(&paths.snapshot)?;
        let last_applied = snapshot.last_applied_sequence()?;

        let Reconstruction {
            mut graph,
            mut notes,
            cycles,
            detached,
        } = reconstruct(snapshot.load_nodes()?);
        if !cycles.is_empty() {
            tracing::error!(
                cycles = cycles.len(),
                detached = detached.len(),
                "snapshot violates the forest invariant; cyclic subtrees detached"
            );
            notes.extend(
                cycles
                    .iter()
                    .map(|cycle| RecoveryNote::CycleDetected { nodes: cycle.clone() }),
            );
        }

        for snippet in snapshot.load_snippets()? {
            let snippet_id = snippet.snippet_id.clone();
            let node = snippet.node_id.clone();
            if let Err(e) = graph.bind_snippet(snippet) {
                tracing::warn!(%snippet_id, %node, ?e, "snippet owner missing after load");
                notes.push(RecoveryNote::UnboundSnippet { snippet_id, node });
            }
        }
        for (snippet_id, version) in snapshot.load_snippet_tombstones()? {
            graph.retire_snippet(&snippet_id, version);
        }

        if let Some(note) = truncate_invalid_tail(&paths.wal)? {
            notes.push(note);
        }

        let mut unfolded_signals = 0;
        let mut replayed = 0u64;
        for entry in WalReader::open_or_empty(&paths.wal).entries_from(last_applied + 1)? {
            let entry = entry?;
            match &entry.operation {
                Operation::EmitSignal { .. } => unfolded_signals += 1,
                Operation::CheckpointMarker { .. } => continue,
                operation => {
                    if let Err(e) = operation.apply(&mut graph) {
                        tracing::warn!(sequence = entry.sequence, ?e, "skipping WAL record");
                        notes.push(RecoveryNote::SkippedOperation {
                            sequence: entry.sequence,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            }
            replayed += 1;
        }

        let wal = WalWriter::open(&paths.wal, last_applied + 1, config.sync_writes)?;

        tracing::info!(
            path = %paths.snapshot.display(),
            nodes = graph.len(),
            last_applied,
            replayed,
            notes = notes.len(),
            "store loaded"
        );

        Ok(Self {
            graph,
            wal,
            snapshot: Mutex::new(snapshot),
            last_applied,
            unfolded_signals,
            ops_since_checkpoint: replayed,
            notes,
            cycles,
            detached,
            events: None,
        })
    }

    /// Append then apply; the operation must already be validated
    fn commit(&mut self, operation: &Operation) -> Result<u64, StoreError> {
        let sequence = self.wal.append(operation)?;
        operation.apply(&mut self.graph)?;
        if let Operation::CheckpointMarker { .. } = operation {
            return Ok(sequence);
        }
        if let Operation::EmitSignal { .. } = operation {
            self.unfolded_signals += 1;
        }
        self.ops_since_checkpoint += 1;
        if let Some(tx) = &self.events {
            let event = MutationEvent {
                sequence,
                kind: operation.opcode(),
            };
            if tx.send(event).is_err() {
                self.events = None;
            }
        }
        Ok(sequence)
    }

    fn insert(&mut self, new: NewNode, now: u64) -> Result<NodeId, StoreError> {
        self.graph.check_insert(&new)?;
        let id = new.id.clone();
        self.commit(&Operation::PutNode(new.into_node(now)))?;
        Ok(id)
    }

    fn update_value(&mut self, id: &NodeId, value: Value, now: u64) -> Result<u64, StoreError> {
        if !self.graph.contains(id) {
            return Err(GraphError::NodeNotFound(id.clone()).into());
        }
        self.commit(&Operation::UpdateValue {
            id: id.clone(),
            value,
            modified_at_micros: now,
        })
    }

    /// Log a full node rewrite for changes without a dedicated opcode
    fn rewrite(
        &mut self,
        id: &NodeId,
        now: u64,
        change: impl FnOnce(&mut Node),
    ) -> Result<u64, StoreError> {
        let mut node = self
            .graph
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        change(&mut node);
        node.touch(now);
        self.commit(&Operation::PutNode(node))
    }

    fn delete(&mut self, id: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let removed = self.graph.subtree(id)?;
        self.commit(&Operation::DeleteNode { id: id.clone() })?;
        Ok(removed)
    }

    fn slot(&self, parent: Option<&NodeId>, key: &str) -> Option<NodeId> {
        match parent {
            Some(parent) => self.graph.child(parent, key),
            None => self.graph.root(key),
        }
        .map(|node| node.id.clone())
    }

    /// Walk `keys` from the roots, creating `Object` nodes where missing
    fn ensure_objects(
        &mut self,
        keys: &[&str],
        ids: &dyn IdGen,
        now: u64,
    ) -> Result<Option<NodeId>, StoreError> {
        let mut parent = None;
        for key in keys {
            let id = match self.slot(parent.as_ref(), key) {
                Some(id) => id,
                None => {
                    let new = NewNode {
                        id: ids.next_id(),
                        parent_id: parent.clone(),
                        key: key.to_string(),
                        kind: NodeKind::Object,
                        ..NewNode::default()
                    };
                    self.insert(new, now)?
                }
            };
            parent = Some(id);
        }
        Ok(parent)
    }

    /// Make the node at `parent.key` hold `kind` and `value`, creating it if
    /// needed and logging only what changed
    ///
    /// A `None` value keeps the current one; a new or re-kinded node starts
    /// out null.
    fn put_slot(
        &mut self,
        parent: Option<NodeId>,
        key: &str,
        kind: NodeKind,
        value: Option<Value>,
        ids: &dyn IdGen,
        now: u64,
    ) -> Result<NodeId, StoreError> {
        let Some(id) = self.slot(parent.as_ref(), key) else {
            let new = NewNode {
                id: ids.next_id(),
                parent_id: parent,
                key: key.to_string(),
                kind,
                value: value.unwrap_or_default(),
                ..NewNode::default()
            };
            return self.insert(new, now);
        };
        let node = self
            .graph
            .get(&id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        if node.kind != kind {
            self.rewrite(&id, now, |node| {
                node.kind = kind;
                node.value = value.unwrap_or_default();
            })?;
        } else if let Some(value) = value {
            self.set_if_changed(&id, value, now)?;
        }
        Ok(id)
    }

    fn set_if_changed(&mut self, id: &NodeId, value: Value, now: u64) -> Result<(), StoreError> {
        let unchanged = self.graph.get(id).is_some_and(|node| node.value == value);
        if !unchanged {
            self.update_value(id, value, now)?;
        }
        Ok(())
    }

    fn write_json_at(
        &mut self,
        parent: Option<NodeId>,
        key: &str,
        json: &serde_json::Value,
        ids: &dyn IdGen,
        now: u64,
    ) -> Result<NodeId, StoreError> {
        match json {
            serde_json::Value::Object(fields) => {
                let id =
                    self.put_slot(parent, key, NodeKind::Object, Some(Value::Null), ids, now)?;
                for (field, value) in fields {
                    self.write_json_at(Some(id.clone()), field, value, ids, now)?;
                }
                self.prune_children(&id, fields.keys().map(String::as_str).collect())?;
                Ok(id)
            }
            serde_json::Value::Array(items) => {
                let id = self.put_slot(parent, key, NodeKind::Object, None, ids, now)?;
                let mut children = Vec::with_capacity(items.len());
                let keys: Vec<String> = (0..items.len()).map(|i| i.to_string()).collect();
                for (key, item) in keys.iter().zip(items) {
                    children.push(self.write_json_at(Some(id.clone()), key, item, ids, now)?);
                }
                self.prune_children(&id, keys.iter().map(String::as_str).collect())?;
                self.set_if_changed(&id, Value::Sequence(children), now)?;
                Ok(id)
            }
            scalar => {
                let value = Value::from_json_scalar(scalar).unwrap_or_default();
                let id = self.put_slot(parent, key, NodeKind::Raw, Some(value), ids, now)?;
                self.prune_children(&id, BTreeSet::new())?;
                Ok(id)
            }
        }
    }

    fn prune_children(&mut self, id: &NodeId, keep: BTreeSet<&str>) -> Result<(), StoreError> {
        let stale: Vec<NodeId> = self
            .graph
            .children(id)
            .filter(|child| !keep.contains(child.key.as_str()))
            .map(|child| child.id.clone())
            .collect();
        for child in stale {
            self.delete(&child)?;
        }
        Ok(())
    }

    /// Signals between the snapshot and the end of the WAL
    fn unfolded_signal_records(&self) -> Result<Vec<Signal>, StoreError> {
        let mut signals = Vec::new();
        let entries = WalReader::open_or_empty(self.wal.path())
            .entries_between(self.last_applied + 1, self.wal.position())?;
        for entry in entries {
            let entry = entry?;
            if let Some(signal) = entry.operation.as_signal(entry.sequence) {
                signals.push(signal);
            }
        }
        Ok(signals)
    }

    fn checkpoint(
        &mut self,
        paths: &StorePaths,
        config: &StoreConfig,
        now: u64,
    ) -> Result<Option<CheckpointReport>, StoreError> {
        if !self.graph.is_dirty() && self.wal.last_sequence() <= self.last_applied {
            return Ok(None);
        }

        let signals = self.unfolded_signal_records()?;
        let sequence = self.wal.append(&Operation::CheckpointMarker {
            timestamp_micros: now,
        })?;

        let summary = {
            let removed = self.graph.removed();
            let batch = CheckpointBatch {
                nodes: self.graph.dirty_nodes().collect(),
                removed_nodes: removed.nodes,
                snippets: self.graph.dirty_snippets().collect(),
                removed_snippets: removed.snippets,
                signals,
                last_applied_sequence: sequence,
            };
            self.snapshot
                .get_mut()
                .unwrap_or_else(|e| e.into_inner())
                .write_checkpoint(&batch)?
        };

        // The snapshot commit is durable; the WAL below the marker is now
        // redundant
        self.graph.mark_clean();
        self.last_applied = sequence;
        self.unfolded_signals = 0;
        self.ops_since_checkpoint = 0;

        let compaction = compact_wal(&paths.wal, sequence)?;
        self.wal = WalWriter::open(&paths.wal, sequence + 1, config.sync_writes)?;

        tracing::info!(
            sequence,
            nodes_written = summary.nodes_written,
            nodes_deleted = summary.nodes_deleted,
            snippets_written = summary.snippets_written,
            signals_written = summary.signals_written,
            "checkpoint complete"
        );

        Ok(Some(CheckpointReport {
            sequence,
            summary,
            compaction,
        }))
    }
}

/// Truncate the WAL at its first invalid record
///
/// A file with a foreign header is never touched.
fn truncate_invalid_tail(wal_path: &Path) -> Result<Option<RecoveryNote>, StoreError> {
    let validation = WalReader::open_or_empty(wal_path).validate()?;
    let Some(corruption) = validation.corruption else {
        return Ok(None);
    };
    if validation.last_valid_position == 0 {
        return Err(WalReadError::BadMagic.into());
    }

    let discarded_bytes = validation.file_len - validation.last_valid_position;
    let file = std::fs::OpenOptions::new().write(true).open(wal_path)?;
    file.set_len(validation.last_valid_position)?;
    file.sync_all()?;

    tracing::warn!(
        offset = corruption.offset,
        reason = %corruption.reason,
        discarded_bytes,
        "WAL truncated at first invalid record"
    );
    Ok(Some(RecoveryNote::WalTruncated {
        offset: corruption.offset,
        reason: corruption.reason,
        discarded_bytes,
    }))
}

/// Rewrite the WAL keeping only records after `sequence`
fn compact_wal(wal_path: &Path, sequence: u64) -> Result<CompactionResult, StoreError> {
    let old_size = std::fs::metadata(wal_path).map(|m| m.len()).unwrap_or(0);

    let mut kept = Vec::new();
    let mut entries_removed = 0;
    for entry in WalReader::open_or_empty(wal_path).entries()? {
        let entry = entry?;
        if entry.sequence <= sequence {
            entries_removed += 1;
            continue;
        }
        kept.push(WalRecord::new(
            entry.sequence,
            entry.operation.opcode(),
            entry.operation.encode_payload(),
        ));
    }

    let temp_path = with_suffix(wal_path, ".compact.tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(MAGIC)?;
        for record in &kept {
            file.write_all(&record.to_bytes())?;
        }
        file.sync_all()?;
    }
    std::fs::rename(&temp_path, wal_path)?;
    if let Some(dir) = wal_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(e) = File::open(dir).and_then(|dir| dir.sync_all()) {
            tracing::warn!(?e, "failed to sync WAL directory after compaction");
        }
    }

    let new_size = std::fs::metadata(wal_path).map(|m| m.len()).unwrap_or(0);
    let result = CompactionResult {
        entries_removed,
        entries_kept: kept.len(),
        bytes_reclaimed: old_size.saturating_sub(new_size),
    };
    tracing::debug!(
        entries_removed = result.entries_removed,
        entries_kept = result.entries_kept,
        bytes_reclaimed = result.bytes_reclaimed,
        "WAL compacted"
    );
    Ok(result)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
