// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fxd_core::{FakeClock, Scalar, SequentialIdGen};
use serde_json::json;
use tempfile::TempDir;

fn options(prefix: &str) -> StoreOptions {
    StoreOptions::default()
        .with_clock(FakeClock::new())
        .with_ids(SequentialIdGen::new(prefix))
        .with_config(StoreConfig {
            sync_writes: false,
            ..StoreConfig::default()
        })
}

fn temp_store() -> (TempDir, PathBuf, Store) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.fxd");
    let store = Store::create_with(&path, options("a")).unwrap();
    (dir, path, store)
}

fn reopen(path: &Path, prefix: &str) -> Store {
    Store::open_with(path, options(prefix)).unwrap()
}

fn value_at(store: &Store, path: &str) -> Option<Value> {
    store.resolve(path).unwrap().map(|node| node.value)
}

#[test]
fn paths_sit_beside_snapshot() {
    let paths = StorePaths::new(Path::new("/data/graph.fxd"));
    assert_eq!(paths.wal, PathBuf::from("/data/graph.fxd.wal"));
    assert_eq!(paths.lock, PathBuf::from("/data/graph.fxd.lock"));
}

#[test]
fn create_refuses_existing_store() {
    let (_dir, path, store) = temp_store();
    store.close().unwrap();
    assert!(matches!(
        Store::create_with(&path, options("b")),
        Err(StoreError::AlreadyExists(_))
    ));
}

#[test]
fn open_requires_existing_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.fxd");
    assert!(matches!(
        Store::open_with(&path, options("a")),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn second_open_is_already_locked() {
    let (_dir, path, _store) = temp_store();
    assert!(matches!(
        Store::open_with(&path, options("b")),
        Err(StoreError::AlreadyLocked { .. })
    ));
}

#[test]
fn close_releases_lock() {
    let (_dir, path, store) = temp_store();
    store.close().unwrap();
    assert!(store.is_closed());
    let reopened = reopen(&path, "b");
    assert!(!reopened.is_closed());
}

#[test]
fn closed_store_rejects_calls() {
    let (_dir, _path, store) = temp_store();
    let handle = store.clone();
    store.close().unwrap();
    store.close().unwrap();

    assert!(matches!(handle.stats(), Err(StoreError::Closed)));
    assert!(matches!(handle.write_path("a", 1.0), Err(StoreError::Closed)));
    assert!(matches!(handle.save(), Err(StoreError::Closed)));
    assert!(matches!(handle.subscribe("s", 0), Err(StoreError::Closed)));
}

#[test]
fn save_then_reopen_round_trips() {
    let (_dir, path, store) = temp_store();
    let app = store
        .create_node(None, "app", NodeKind::Object, Value::Null)
        .unwrap();
    store
        .create_node(Some(&app), "title", NodeKind::Raw, "hello")
        .unwrap();
    let mut metadata = Metadata::new();
    metadata.insert("pinned".into(), Scalar::Bool(true));
    store.set_metadata(&app, metadata).unwrap();
    store
        .put_snippet(NewSnippet {
            snippet_id: "snip-1".into(),
            node_id: app.clone(),
            body: "let x = 1;".into(),
            language: "js".into(),
            virtual_file_path: "/app.js".into(),
            order_index: 0,
        })
        .unwrap();

    let before = store.graph().unwrap();
    assert!(store.save().unwrap().is_some());
    store.close().unwrap();

    let reopened = reopen(&path, "b");
    assert_eq!(reopened.graph().unwrap(), before);
    assert!(reopened.recovery_notes().is_empty());
}

#[test]
fn unsaved_mutations_replay_from_wal() {
    let (_dir, path, store) = temp_store();
    store.write_path("app.config.theme", "dark").unwrap();
    store.write_path("app.config.size", 12.0).unwrap();
    let before = store.graph().unwrap();
    store.close().unwrap();

    let reopened = reopen(&path, "b");
    assert_eq!(reopened.graph().unwrap(), before);
    assert_eq!(reopened.pending_operations().unwrap(), 4);
}

#[test]
fn second_save_is_noop() {
    let (_dir, _path, store) = temp_store();
    store.write_path("app.name", "fxd").unwrap();

    let first = store.save().unwrap().unwrap();
    assert_eq!(first.summary.nodes_written, 2);
    assert!(store.save().unwrap().is_none());
}

#[test]
fn save_compacts_wal() {
    let (_dir, path, store) = temp_store();
    store.write_path("app.name", "fxd").unwrap();
    let report = store.save().unwrap().unwrap();
    assert_eq!(report.sequence, 3);
    assert_eq!(report.compaction.entries_removed, 3);
    assert_eq!(report.compaction.entries_kept, 0);

    store.write_path("app.name", "fxd2").unwrap();
    let validation = Store::validate_wal(&path).unwrap();
    assert_eq!(validation.valid_records, 1);
    assert_eq!(validation.last_valid_sequence, Some(4));
}

#[test]
fn sequences_continue_across_reopen() {
    let (_dir, path, store) = temp_store();
    store.write_path("a", 1.0).unwrap();
    store.save().unwrap();
    store.close().unwrap();

    let reopened = reopen(&path, "b");
    assert_eq!(reopened.emit("s", 1.0).unwrap(), 3);
}

#[test]
fn torn_wal_tail_is_truncated_with_note() {
    let (_dir, path, store) = temp_store();
    let id = store.write_path("counter", 1.0).unwrap();
    store.set_value(&id, 2.0).unwrap();
    store.set_value(&id, 3.0).unwrap();
    let wal = store.paths().wal.clone();
    store.close().unwrap();

    let len = std::fs::metadata(&wal).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&wal).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let reopened = reopen(&path, "b");
    assert_eq!(value_at(&reopened, "counter"), Some(Value::Number(2.0)));
    let notes = reopened.recovery_notes();
    assert_eq!(notes.len(), 1);
    assert!(matches!(notes[0], RecoveryNote::WalTruncated { .. }));

    // The next append lands where the torn record was
    assert_eq!(reopened.set_value(&id, 4.0).unwrap(), 3);
}

#[test]
fn foreign_wal_is_never_truncated() {
    let (_dir, path, store) = temp_store();
    let wal = store.paths().wal.clone();
    store.close().unwrap();
    std::fs::write(&wal, b"not a wal file at all").unwrap();

    assert!(matches!(
        Store::open_with(&path, options("b")),
        Err(StoreError::CorruptEncoding { .. })
    ));
    assert_eq!(std::fs::read(&wal).unwrap(), b"not a wal file at all");
}

#[test]
fn rejected_mutation_leaves_wal_untouched() {
    let (_dir, path, store) = temp_store();
    store.write_path("app", 1.0).unwrap();

    let missing = NodeId::from("nope");
    assert!(matches!(
        store.create_node(Some(&missing), "x", NodeKind::Raw, 1.0),
        Err(StoreError::Graph(GraphError::ParentNotFound(_)))
    ));
    assert!(matches!(
        store.create_node(None, "app", NodeKind::Raw, 3.0),
        Err(StoreError::Graph(GraphError::DuplicateKey { .. }))
    ));
    assert!(matches!(
        store.set_value(&missing, 1.0),
        Err(StoreError::Graph(GraphError::NodeNotFound(_)))
    ));

    assert_eq!(Store::validate_wal(&path).unwrap().valid_records, 1);
    assert_eq!(value_at(&store, "app"), Some(Value::Number(1.0)));
}

#[test]
fn delete_removes_subtree_durably() {
    let (_dir, path, store) = temp_store();
    store.write_path("app.config.theme", "dark").unwrap();
    store.write_path("app.name", "fxd").unwrap();
    store.save().unwrap();

    let config = store.resolve("app.config").unwrap().unwrap().id;
    let removed = store.delete_node(&config).unwrap();
    assert_eq!(removed.len(), 2);
    store.save().unwrap();
    store.close().unwrap();

    let reopened = reopen(&path, "b");
    assert!(value_at(&reopened, "app.config.theme").is_none());
    assert_eq!(value_at(&reopened, "app.name"), Some(Value::from("fxd")));
    assert_eq!(reopened.stats().unwrap().node_count, 2);
}

#[test]
fn unchanged_snippet_is_not_logged() {
    let (_dir, path, store) = temp_store();
    let node = store.write_path("script", Value::Null).unwrap();
    let new = NewSnippet {
        snippet_id: "s-1".into(),
        node_id: node,
        body: "a".into(),
        language: "js".into(),
        virtual_file_path: "/s.js".into(),
        order_index: 0,
    };

    assert_eq!(store.put_snippet(new.clone()).unwrap().unwrap().version, 1);
    assert!(store.put_snippet(new.clone()).unwrap().is_none());
    let changed = NewSnippet {
        body: "b".into(),
        ..new
    };
    assert_eq!(store.put_snippet(changed).unwrap().unwrap().version, 2);
    assert_eq!(Store::validate_wal(&path).unwrap().valid_records, 3);
}

#[test]
fn recreated_snippet_version_survives_reopen() {
    let (_dir, path, store) = temp_store();
    let snippet = |node_id: NodeId, body: &str| NewSnippet {
        snippet_id: "s-1".into(),
        node_id,
        body: body.into(),
        language: "js".into(),
        virtual_file_path: "/s.js".into(),
        order_index: 0,
    };

    let first = store.write_path("first", Value::Null).unwrap();
    store.put_snippet(snippet(first.clone(), "a")).unwrap();
    store.put_snippet(snippet(first.clone(), "b")).unwrap();
    store.delete_node(&first).unwrap();
    store.save().unwrap();
    store.close().unwrap();

    let reopened = reopen(&path, "b");
    let second = reopened.write_path("second", Value::Null).unwrap();
    let put = reopened.put_snippet(snippet(second, "c")).unwrap().unwrap();
    assert_eq!(put.version, 3);
}

#[test]
fn write_json_decomposes_objects_and_arrays() {
    let (_dir, _path, store) = temp_store();
    let config = store
        .write_json(
            "app.config",
            &json!({"theme": "dark", "sizes": [10, 12], "flags": {"beta": true}}),
        )
        .unwrap();

    let node = store.get(&config).unwrap().unwrap();
    assert_eq!(node.kind, NodeKind::Object);
    assert_eq!(value_at(&store, "app.config.theme"), Some(Value::from("dark")));
    assert_eq!(value_at(&store, "app.config.flags.beta"), Some(Value::Bool(true)));
    assert_eq!(value_at(&store, "app.config.sizes.1"), Some(Value::Number(12.0)));

    let sizes = store.resolve("app.config.sizes").unwrap().unwrap();
    let first = store.resolve("app.config.sizes.0").unwrap().unwrap().id;
    let second = store.resolve("app.config.sizes.1").unwrap().unwrap().id;
    assert_eq!(sizes.value, Value::Sequence(vec![first, second]));
}

#[test]
fn write_json_replaces_previous_shape() {
    let (_dir, path, store) = temp_store();
    store
        .write_json("cfg", &json!({"a": 1, "b": [1, 2, 3]}))
        .unwrap();
    store.write_json("cfg", &json!({"b": [1]})).unwrap();

    assert!(store.resolve("cfg.a").unwrap().is_none());
    assert!(store.resolve("cfg.b.1").unwrap().is_none());
    assert_eq!(store.stats().unwrap().node_count, 3);

    // Rewriting identical JSON logs nothing
    let records = Store::validate_wal(&path).unwrap().valid_records;
    store.write_json("cfg", &json!({"b": [1]})).unwrap();
    assert_eq!(Store::validate_wal(&path).unwrap().valid_records, records);
}

#[test]
fn write_json_rejects_dotted_keys() {
    let (_dir, _path, store) = temp_store();
    assert!(matches!(
        store.write_json("cfg", &json!({"a.b": 1})),
        Err(StoreError::Graph(GraphError::InvalidKey(_)))
    ));
}

#[test]
fn stats_count_signals_across_checkpoint() {
    let (_dir, path, store) = temp_store();
    store.write_path("app", Value::Null).unwrap();
    store.emit("s1", 1.0).unwrap();
    store.emit("s2", 2.0).unwrap();
    assert_eq!(
        store.stats().unwrap(),
        StoreStats {
            node_count: 1,
            snippet_count: 0,
            signal_count: 2,
        }
    );

    store.save().unwrap();
    store.emit("s1", 3.0).unwrap();
    assert_eq!(store.stats().unwrap().signal_count, 3);
    store.close().unwrap();

    let reopened = reopen(&path, "b");
    assert_eq!(reopened.stats().unwrap().signal_count, 3);
}

#[test]
fn maybe_checkpoint_waits_for_interval() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.fxd");
    let mut opts = options("a");
    opts.config.checkpoint_interval = 3;
    let store = Store::create_with(&path, opts).unwrap();

    store.write_path("a", 1.0).unwrap();
    store.write_path("b", 1.0).unwrap();
    assert!(store.maybe_checkpoint().unwrap().is_none());
    store.write_path("c", 1.0).unwrap();
    assert!(store.maybe_checkpoint().unwrap().is_some());
    assert_eq!(store.pending_operations().unwrap(), 0);
}

#[test]
fn mutation_events_follow_appends() {
    let (_dir, _path, store) = temp_store();
    let mut events = store.mutation_events().unwrap();

    let id = store.write_path("a", 1.0).unwrap();
    store.set_value(&id, 2.0).unwrap();
    store.emit("s", 1.0).unwrap();
    store.save().unwrap();

    let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| (event.sequence, event.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (1, Opcode::PutNode),
            (2, Opcode::UpdateValue),
            (3, Opcode::EmitSignal),
        ]
    );
}

#[test]
fn load_rebuilds_same_graph() {
    let (_dir, _path, store) = temp_store();
    store.write_path("app.name", "fxd").unwrap();
    store.save().unwrap();
    store.write_path("app.version", 2.0).unwrap();

    let before = store.graph().unwrap();
    store.load().unwrap();
    assert_eq!(store.graph().unwrap(), before);
}

#[test]
fn repair_wal_needs_the_lock() {
    let (_dir, path, store) = temp_store();
    let id = store.write_path("a", 1.0).unwrap();
    store.set_value(&id, 2.0).unwrap();

    assert!(matches!(
        Store::repair_wal(&path),
        Err(StoreError::AlreadyLocked { .. })
    ));

    let wal = store.paths().wal.clone();
    store.close().unwrap();
    let len = std::fs::metadata(&wal).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&wal).unwrap();
    file.set_len(len - 1).unwrap();
    drop(file);

    let before = Store::validate_wal(&path).unwrap();
    assert!(before.corruption.is_some());
    assert_eq!(Store::repair_wal(&path).unwrap(), before.invalid_tail());
    assert_eq!(Store::repair_wal(&path).unwrap(), 0);
    assert_eq!(Store::validate_wal(&path).unwrap().valid_records, 1);
}
