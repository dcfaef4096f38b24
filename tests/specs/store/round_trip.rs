//! Round-trip specs
//!
//! Verify a graph loads back structurally equal, whether it was
//! checkpointed, left in the WAL, or split between the two.

use crate::prelude::*;
use fxd_core::{Metadata, Scalar};
use proptest::prelude::*;
use serde_json::json;

fn build_sample(store: &Store) {
    let app = store
        .create_node(None, "app", NodeKind::Object, Value::Null)
        .unwrap();
    let theme = store.write_path("app.config.theme", "dark").unwrap();
    store
        .write_path("app.logo", Value::Blob(vec![0, 1, 2, 255]))
        .unwrap();
    let items = store
        .write_json("app.items", &json!([1, "two", null, true]))
        .unwrap();
    store.set_prototypes(&items, vec![app.clone()]).unwrap();

    let mut metadata = Metadata::new();
    metadata.insert("owner".into(), Scalar::String("ops".into()));
    metadata.insert("weight".into(), Scalar::Number(0.5));
    store.set_metadata(&app, metadata).unwrap();

    store
        .insert_node(
            NewNode::root("plugins-root", "plugins")
                .kind(NodeKind::Other("plugin-host".into()))
                .value(3.0),
        )
        .unwrap();
    let scratch = store.write_path("app.scratch.tmp", 1.0).unwrap();
    store
        .put_snippet(NewSnippet {
            snippet_id: "theme-css".into(),
            node_id: theme,
            body: "body { color: black; }".into(),
            language: "css".into(),
            virtual_file_path: "/app/theme.css".into(),
            order_index: 2,
        })
        .unwrap();
    store.delete_node(&scratch).unwrap();
}

#[test]
fn saved_graph_loads_equal() {
    let temp = TempStore::new();
    let store = temp.create();
    build_sample(&store);
    let before = store.graph().unwrap();
    store.save().unwrap();
    store.close().unwrap();

    let reopened = temp.open();
    similar_asserts::assert_eq!(reopened.graph().unwrap(), before);
    assert!(reopened.recovery_notes().is_empty());
}

#[test]
fn unsaved_graph_loads_equal_from_wal() {
    let temp = TempStore::new();
    let store = temp.create();
    build_sample(&store);
    let before = store.graph().unwrap();
    store.close().unwrap();

    let reopened = temp.open();
    similar_asserts::assert_eq!(reopened.graph().unwrap(), before);
}

#[test]
fn graph_split_between_snapshot_and_wal_loads_equal() {
    let temp = TempStore::new();
    let store = temp.create();
    build_sample(&store);
    store.save().unwrap();

    store.write_path("app.config.theme", "light").unwrap();
    let logo = node_id(&store, "app.logo");
    store.delete_node(&logo).unwrap();
    store.write_json("app.items", &json!(["one"])).unwrap();
    let before = store.graph().unwrap();
    store.close().unwrap();

    let reopened = temp.open();
    similar_asserts::assert_eq!(reopened.graph().unwrap(), before);
    assert_eq!(value_at(&reopened, "app.config.theme"), Some(Value::from("light")));
    assert!(value_at(&reopened, "app.logo").is_none());
}

#[test]
fn snippet_stays_bound_to_its_node() {
    let temp = TempStore::new();
    let store = temp.create();
    build_sample(&store);
    store.save().unwrap();
    store.close().unwrap();

    let reopened = temp.open();
    let theme = node_id(&reopened, "app.config.theme");
    let snippet = reopened
        .with_graph(|graph| graph.snippet_for_node(&theme).cloned())
        .unwrap()
        .unwrap();
    assert_eq!(snippet.snippet_id, "theme-css");
    assert_eq!(snippet.order_index, 2);
    assert_eq!(snippet.version, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_forest_round_trips(
        ops in proptest::collection::vec((any::<prop::sample::Index>(), 0u8..4, any::<i32>()), 1..40),
        save_at in any::<prop::sample::Index>(),
    ) {
        let temp = TempStore::new();
        let store = temp.create();
        let save_at = save_at.index(ops.len());
        let mut ids: Vec<NodeId> = Vec::new();

        for (i, (parent, choice, n)) in ops.iter().enumerate() {
            let parent = match (*choice, ids.is_empty()) {
                (0, _) | (_, true) => None,
                _ => Some(parent.get(&ids).clone()),
            };
            let value = match choice {
                1 => Value::Number(f64::from(*n)),
                2 => Value::String(format!("s{n}")),
                _ => Value::Null,
            };
            let id = store
                .create_node(parent.as_ref(), &format!("k{i}"), NodeKind::Raw, value)
                .unwrap();
            ids.push(id);
            if i == save_at {
                store.save().unwrap();
            }
        }

        let before = store.graph().unwrap();
        store.close().unwrap();

        let reopened = temp.open();
        prop_assert_eq!(reopened.graph().unwrap(), before);
        prop_assert!(reopened.recovery_notes().is_empty());
    }
}
