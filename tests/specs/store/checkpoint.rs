//! Checkpoint specs
//!
//! Verify saves are idempotent and only rewrite what changed.

use crate::prelude::*;

type Rows = Vec<Vec<String>>;

/// Every row of every snapshot table, rendered for comparison
fn dump(temp: &TempStore) -> Vec<(String, Rows)> {
    let db = temp.snapshot_db();
    let tables = [
        ("nodes", "SELECT * FROM nodes ORDER BY id"),
        ("snippets", "SELECT * FROM snippets ORDER BY id"),
        ("signals", "SELECT * FROM signals ORDER BY sequence"),
        ("store_meta", "SELECT * FROM store_meta"),
    ];
    tables
        .iter()
        .map(|(table, sql)| {
            let mut stmt = db.prepare(sql).unwrap();
            let columns = stmt.column_count();
            let rows = stmt
                .query_map([], |row| {
                    (0..columns)
                        .map(|i| row.get_ref(i).map(|v| format!("{v:?}")))
                        .collect::<Result<Vec<_>, _>>()
                })
                .unwrap()
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            (table.to_string(), rows)
        })
        .collect()
}

fn populate(store: &Store) {
    store.write_path("app.config.theme", "dark").unwrap();
    store.write_path("app.name", "fxd").unwrap();
    let node = node_id(store, "app.name");
    store
        .put_snippet(NewSnippet {
            snippet_id: "name-js".into(),
            node_id: node,
            body: "export default 'fxd'".into(),
            language: "js".into(),
            virtual_file_path: "/name.js".into(),
            order_index: 0,
        })
        .unwrap();
    store.emit("audit", "created").unwrap();
}

#[test]
fn second_save_changes_nothing() {
    let temp = TempStore::new();
    let store = temp.create();
    populate(&store);

    assert!(store.save().unwrap().is_some());
    let first = dump(&temp);
    assert!(store.save().unwrap().is_none());
    similar_asserts::assert_eq!(dump(&temp), first);
}

#[test]
fn save_after_reopen_changes_nothing() {
    let temp = TempStore::new();
    let store = temp.create();
    populate(&store);
    store.save().unwrap();
    store.close().unwrap();
    let first = dump(&temp);

    let reopened = temp.open();
    assert!(reopened.save().unwrap().is_none());
    reopened.close().unwrap();
    similar_asserts::assert_eq!(dump(&temp), first);
}

#[test]
fn incremental_save_writes_only_dirty_nodes() {
    let temp = TempStore::new();
    let store = temp.create();
    populate(&store);
    store.save().unwrap();

    store.write_path("app.config.theme", "light").unwrap();
    let report = store.save().unwrap().unwrap();
    assert_eq!(report.summary.nodes_written, 1);
    assert_eq!(report.summary.snippets_written, 0);
    assert_eq!(report.summary.signals_written, 0);
}

#[test]
fn rewriting_same_value_is_not_a_change() {
    let temp = TempStore::new();
    let store = temp.create();
    populate(&store);
    store.save().unwrap();
    let first = dump(&temp);

    // Logged and replayed, but the stored row is identical
    let theme = node_id(&store, "app.config.theme");
    let nodes_before: Vec<_> = first[0].1.clone();
    store.set_value(&theme, "dark").unwrap();
    let report = store.save().unwrap().unwrap();
    assert_eq!(report.summary.nodes_written, 0);
    assert_eq!(report.summary.nodes_unchanged, 1);

    let after = dump(&temp);
    assert_eq!(after[0].1, nodes_before);
}

#[test]
fn checkpoint_prunes_the_wal() {
    let temp = TempStore::new();
    let store = temp.create();
    populate(&store);
    assert!(Store::validate_wal(temp.path()).unwrap().valid_records > 0);

    store.save().unwrap();
    let validation = Store::validate_wal(temp.path()).unwrap();
    assert_eq!(validation.valid_records, 0);
    assert!(validation.corruption.is_none());
}
