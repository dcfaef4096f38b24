//! Orphan and cycle specs
//!
//! Verify dangling parents are recovered as roots with a note, and parent
//! cycles are cut out of the graph without taking the rest of it down.

use crate::prelude::*;
use rusqlite::params;

fn saved_tree(temp: &TempStore) -> (NodeId, NodeId, NodeId) {
    let store = temp.create();
    let theme = store.write_path("app.config.theme", "dark").unwrap();
    let app = node_id(&store, "app");
    let config = node_id(&store, "app.config");
    store.save().unwrap();
    store.close().unwrap();
    (app, config, theme)
}

fn set_parent(temp: &TempStore, id: &NodeId, parent: &str) {
    temp.snapshot_db()
        .execute(
            "UPDATE nodes SET parent_id = ?1 WHERE id = ?2",
            params![parent, id.as_str()],
        )
        .unwrap();
}

#[test]
fn dangling_parent_becomes_root_with_note() {
    let temp = TempStore::new();
    let (_app, config, theme) = saved_tree(&temp);
    set_parent(&temp, &config, "ghost");

    let store = temp.open();
    let node = store.get(&config).unwrap().unwrap();
    assert!(node.parent_id.is_none());
    assert_eq!(node_id(&store, "config"), config);
    assert_eq!(node_id(&store, "config.theme"), theme);
    assert!(store.resolve("app.config").unwrap().is_none());

    assert_eq!(
        store.recovery_notes(),
        vec![RecoveryNote::OrphanReference {
            node: config,
            missing_parent: NodeId::from("ghost"),
        }]
    );
}

#[test]
fn recovered_orphan_is_persisted_as_root() {
    let temp = TempStore::new();
    let (_app, config, _theme) = saved_tree(&temp);
    set_parent(&temp, &config, "ghost");

    let store = temp.open();
    let report = store.save().unwrap().unwrap();
    assert_eq!(report.summary.nodes_written, 1);
    store.close().unwrap();

    let reopened = temp.open();
    assert!(reopened.recovery_notes().is_empty());
    assert_eq!(
        value_at(&reopened, "config.theme"),
        Some(Value::from("dark"))
    );
}

#[test]
fn orphan_key_clash_with_root_still_loads() {
    let temp = TempStore::new();
    let store = temp.create();
    store.write_path("app.config", 1.0).unwrap();
    store.write_path("config", 2.0).unwrap();
    let nested = node_id(&store, "app.config");
    store.save().unwrap();
    store.close().unwrap();
    set_parent(&temp, &nested, "ghost");

    let store = temp.open();
    assert_eq!(store.stats().unwrap().node_count, 3);
    assert!(store
        .recovery_notes()
        .iter()
        .any(|note| matches!(note, RecoveryNote::OrphanReference { node, .. } if *node == nested)));
}

#[test]
fn parent_cycle_is_detached_and_reported() {
    let temp = TempStore::new();
    let (app, config, theme) = saved_tree(&temp);
    set_parent(&temp, &app, config.as_str());

    let store = temp.open();
    assert!(store.resolve("app").unwrap().is_none());
    assert_eq!(store.stats().unwrap().node_count, 0);

    let mut detached: Vec<NodeId> = store.detached().into_iter().map(|node| node.id).collect();
    detached.sort();
    let mut expected = vec![app.clone(), config.clone(), theme];
    expected.sort();
    assert_eq!(detached, expected);

    match store.cycle_errors().as_slice() {
        [StoreError::CycleDetected { nodes }] => {
            assert_eq!(nodes.len(), 2);
            assert!(nodes.contains(&app));
            assert!(nodes.contains(&config));
        }
        other => panic!("expected one CycleDetected, got {other:?}"),
    }
    assert!(store
        .recovery_notes()
        .iter()
        .any(|note| matches!(note, RecoveryNote::CycleDetected { nodes } if nodes.len() == 2)));
}

#[test]
fn unrelated_root_survives_next_to_cycle() {
    let temp = TempStore::new();
    let store = temp.create();
    store.write_path("other.value", "keep me").unwrap();
    store.write_path("app.config", 1.0).unwrap();
    let app = node_id(&store, "app");
    let config = node_id(&store, "app.config");
    store.save().unwrap();
    store.close().unwrap();
    set_parent(&temp, &app, config.as_str());

    let store = temp.open();
    assert_eq!(value_at(&store, "other.value"), Some(Value::from("keep me")));
    assert_eq!(store.cycle_errors().len(), 1);

    // The rest of the graph stays writable and the cyclic rows stay as found
    store.write_path("other.extra", true).unwrap();
    store.save().unwrap();
    store.close().unwrap();

    let parent: String = temp
        .snapshot_db()
        .query_row(
            "SELECT parent_id FROM nodes WHERE id = ?1",
            params![app.as_str()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(parent, config.as_str());

    let reopened = temp.open();
    assert_eq!(value_at(&reopened, "other.extra"), Some(Value::Bool(true)));
    assert_eq!(reopened.detached().len(), 2);
}

#[test]
fn self_parent_is_detached() {
    let temp = TempStore::new();
    let (app, _config, _theme) = saved_tree(&temp);
    set_parent(&temp, &app, app.as_str());

    let store = temp.open();
    assert_eq!(store.detached().len(), 3);
    match store.cycle_errors().as_slice() {
        [StoreError::CycleDetected { nodes }] => assert_eq!(nodes, &vec![app]),
        other => panic!("expected one CycleDetected, got {other:?}"),
    }
}
