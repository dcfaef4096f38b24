//! Checksum specs
//!
//! Verify that damaged snapshot rows are refused at load instead of being
//! returned as data.

use crate::prelude::*;
use rusqlite::params;

fn saved_store(temp: &TempStore) -> NodeId {
    let store = temp.create();
    let theme = store.write_path("app.config.theme", "dark").unwrap();
    store.emit("audit", "saved").unwrap();
    store.save().unwrap();
    store.close().unwrap();
    theme
}

fn flip_bit(bytes: &mut [u8], index: usize, bit: u8) {
    bytes[index] ^= 1 << bit;
}

#[test]
fn flipped_value_bit_is_checksum_mismatch() {
    for bit in 0..8 {
        let temp = TempStore::new();
        let theme = saved_store(&temp);

        let db = temp.snapshot_db();
        let mut value: Vec<u8> = db
            .query_row(
                "SELECT value_bytes FROM nodes WHERE id = ?1",
                params![theme.as_str()],
                |row| row.get(0),
            )
            .unwrap();
        let last = value.len() - 1;
        flip_bit(&mut value, last, bit);
        db.execute(
            "UPDATE nodes SET value_bytes = ?1 WHERE id = ?2",
            params![value, theme.as_str()],
        )
        .unwrap();
        drop(db);

        match temp.try_open() {
            Err(StoreError::ChecksumMismatch { location }) => {
                assert!(location.contains(theme.as_str()), "{location}");
            }
            Err(other) => panic!("bit {bit}: expected ChecksumMismatch, got {other:?}"),
            Ok(_) => panic!("bit {bit}: corrupted snapshot loaded"),
        }
    }
}

#[test]
fn flipped_metadata_bit_is_checksum_mismatch() {
    let temp = TempStore::new();
    let theme = saved_store(&temp);

    let db = temp.snapshot_db();
    let mut metadata: Vec<u8> = db
        .query_row(
            "SELECT metadata_bytes FROM nodes WHERE id = ?1",
            params![theme.as_str()],
            |row| row.get(0),
        )
        .unwrap();
    flip_bit(&mut metadata, 0, 1);
    db.execute(
        "UPDATE nodes SET metadata_bytes = ?1 WHERE id = ?2",
        params![metadata, theme.as_str()],
    )
    .unwrap();
    drop(db);

    assert!(matches!(
        temp.try_open(),
        Err(StoreError::ChecksumMismatch { .. })
    ));
}

#[test]
fn tampered_snippet_is_checksum_mismatch() {
    let temp = TempStore::new();
    let store = temp.create();
    let node = store.write_path("script", Value::Null).unwrap();
    store
        .put_snippet(NewSnippet {
            snippet_id: "s-1".into(),
            node_id: node,
            body: "return 1".into(),
            language: "lua".into(),
            virtual_file_path: "/s.lua".into(),
            order_index: 0,
        })
        .unwrap();
    store.save().unwrap();
    store.close().unwrap();

    temp.snapshot_db()
        .execute("UPDATE snippets SET body = 'return 2' WHERE snippet_id = 's-1'", [])
        .unwrap();

    assert!(matches!(
        temp.try_open(),
        Err(StoreError::ChecksumMismatch { .. })
    ));
}

#[test]
fn tampered_signal_fails_replay() {
    let temp = TempStore::new();
    saved_store(&temp);
    temp.snapshot_db()
        .execute("UPDATE signals SET timestamp = timestamp + 1", [])
        .unwrap();

    let store = temp.open();
    let mut subscription = store.subscribe("audit", 0).unwrap();
    assert!(matches!(
        subscription.try_next(),
        Some(Err(StoreError::ChecksumMismatch { .. }))
    ));
}

#[test]
fn untouched_snapshot_loads() {
    let temp = TempStore::new();
    let theme = saved_store(&temp);
    let store = temp.open();
    assert_eq!(
        store.get(&theme).unwrap().map(|node| node.value),
        Some(Value::from("dark"))
    );
}
