//! Crash-safety specs
//!
//! Verify that cutting the WAL at any byte yields exactly the state after
//! the last complete record, and that recovery is reported, not raised.

use crate::prelude::*;
use serde_json::json;

/// Apply a scripted series of mutations, recording the graph and the end of
/// the WAL after each one
fn scripted_history(temp: &TempStore) -> Vec<(u64, Graph)> {
    let store = temp.create();
    let mut history = vec![(8, store.graph().unwrap())];
    let mut record = |store: &Store| {
        let end = Store::validate_wal(temp.path())
            .unwrap()
            .last_valid_position;
        history.push((end, store.graph().unwrap()));
    };

    let app = store
        .create_node(None, "app", NodeKind::Object, Value::Null)
        .unwrap();
    record(&store);
    let theme = store
        .create_node(Some(&app), "theme", NodeKind::Raw, "dark")
        .unwrap();
    record(&store);
    store.set_value(&theme, "light").unwrap();
    record(&store);
    store
        .put_snippet(NewSnippet {
            snippet_id: "theme-css".into(),
            node_id: theme.clone(),
            body: "a { }".into(),
            language: "css".into(),
            virtual_file_path: "/t.css".into(),
            order_index: 0,
        })
        .unwrap();
    record(&store);
    store.emit("audit", "theme changed").unwrap();
    record(&store);
    store.delete_node(&theme).unwrap();
    record(&store);

    store.close().unwrap();
    history
}

#[test]
fn every_truncation_point_recovers_last_complete_record() {
    let temp = TempStore::new();
    let history = scripted_history(&temp);
    let wal = temp.wal_path();
    let full = std::fs::read(&wal).unwrap();
    assert_eq!(full.len() as u64, history.last().unwrap().0);

    for cut in 0..=full.len() {
        std::fs::write(&wal, &full[..cut]).unwrap();

        let expected = history
            .iter()
            .rev()
            .find(|(end, _)| *end <= cut as u64)
            .map(|(_, graph)| graph.clone())
            .unwrap_or_default();

        let store = temp.open();
        similar_asserts::assert_eq!(store.graph().unwrap(), expected, "cut at byte {cut}");

        let torn = history.iter().all(|(end, _)| *end != cut as u64) && cut > 8;
        let truncated = store
            .recovery_notes()
            .iter()
            .any(|note| matches!(note, RecoveryNote::WalTruncated { .. }));
        assert_eq!(truncated, torn, "cut at byte {cut}");
        store.close().unwrap();
    }
}

#[test]
fn corrupt_byte_ends_log_at_that_record() {
    let temp = TempStore::new();
    let history = scripted_history(&temp);
    let wal = temp.wal_path();
    let mut bytes = std::fs::read(&wal).unwrap();

    // Flip a payload byte inside the third record
    let (start, end) = (history[2].0, history[3].0);
    let offset = ((start + end) / 2) as usize;
    bytes[offset] ^= 0x01;
    std::fs::write(&wal, &bytes).unwrap();

    let store = temp.open();
    similar_asserts::assert_eq!(store.graph().unwrap(), history[2].1.clone());
    match store.recovery_notes().as_slice() {
        [RecoveryNote::WalTruncated {
            offset,
            discarded_bytes,
            ..
        }] => {
            assert_eq!(*offset, start);
            assert_eq!(*discarded_bytes, bytes.len() as u64 - start);
        }
        other => panic!("expected one truncation note, got {other:?}"),
    }
}

#[test]
fn recovered_store_accepts_new_writes() {
    let temp = TempStore::new();
    let history = scripted_history(&temp);
    let wal = temp.wal_path();
    let full = std::fs::read(&wal).unwrap();
    let cut = history[3].0 as usize + 5;
    std::fs::write(&wal, &full[..cut]).unwrap();

    let store = temp.open();
    store.write_json("app.extra", &json!({"ok": true})).unwrap();
    let before = store.graph().unwrap();
    store.close().unwrap();

    let reopened = temp.open();
    similar_asserts::assert_eq!(reopened.graph().unwrap(), before);
    assert!(reopened.recovery_notes().is_empty());
}

#[test]
fn validate_reports_without_modifying() {
    let temp = TempStore::new();
    let history = scripted_history(&temp);
    let wal = temp.wal_path();
    let full = std::fs::read(&wal).unwrap();
    let cut = history[4].0 as usize - 2;
    std::fs::write(&wal, &full[..cut]).unwrap();

    let validation = Store::validate_wal(temp.path()).unwrap();
    assert_eq!(validation.valid_records, 3);
    assert_eq!(validation.last_valid_sequence, Some(3));
    assert_eq!(validation.last_valid_position, history[3].0);
    assert!(validation.corruption.is_some());
    assert_eq!(std::fs::read(&wal).unwrap().len(), cut);

    assert_eq!(Store::repair_wal(temp.path()).unwrap(), cut as u64 - history[3].0);
    assert!(Store::validate_wal(temp.path()).unwrap().corruption.is_none());
}
