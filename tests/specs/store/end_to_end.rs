//! End-to-end store specs
//!
//! Verify the create, write, save, reopen, read cycle through the public API.

use crate::prelude::*;
use serde_json::json;

#[test]
fn nested_config_survives_reopen() {
    let temp = TempStore::new();
    let store = temp.create();
    store
        .create_node(None, "app", NodeKind::Object, Value::Null)
        .unwrap();
    store
        .write_json("app.config", &json!({"theme": "dark"}))
        .unwrap();
    store.save().unwrap();
    store.close().unwrap();

    let reopened = temp.open();
    assert_eq!(
        value_at(&reopened, "app.config.theme"),
        Some(Value::from("dark"))
    );
    assert!(reopened.stats().unwrap().node_count >= 3);
}

#[test]
fn stats_do_not_mutate() {
    let temp = TempStore::new();
    let store = temp.create();
    store.write_path("app.name", "fxd").unwrap();
    store.emit("audit", 1.0).unwrap();
    store.save().unwrap();

    let first = store.stats().unwrap();
    assert_eq!(first, store.stats().unwrap());
    assert!(store.save().unwrap().is_none());
    assert_eq!(first.node_count, 2);
    assert_eq!(first.signal_count, 1);
}

#[test]
fn second_writer_is_refused() {
    let temp = TempStore::new();
    let _store = temp.create();
    assert!(matches!(
        temp.try_open(),
        Err(StoreError::AlreadyLocked { .. })
    ));
}

#[tokio::test]
async fn scheduler_checkpoints_in_background() {
    let temp = TempStore::new();
    let store = temp.create();
    let scheduler = fxd_storage::CheckpointScheduler::spawn(store.clone()).unwrap();

    store.write_json("app", &json!({"a": 1, "b": 2})).unwrap();
    let report = scheduler.shutdown().await.unwrap();
    assert_eq!(report.checkpoints, 1);
    store.close().unwrap();

    assert_eq!(Store::validate_wal(temp.path()).unwrap().valid_records, 0);
    let reopened = temp.open();
    assert_eq!(value_at(&reopened, "app.b"), Some(Value::Number(2.0)));
}
