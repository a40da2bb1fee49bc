//! Tests for TreeLevel, IndexMap and NodeMap
//!
//! These tests verify:
//! - Literal get/set/delete/keys
//! - Nested values are forged and linked in both maps
//! - Overwrite and delete purge the previous subtree
//! - A failed forge leaves the key absent from both maps
//! - Reserved keys and engine-only values are refused
//! - Missing index links are restored on read

use std::sync::Arc;

use shardtree::config::Config;
use shardtree::file::{Debouncer, FileTable};
use shardtree::report::Reporter;
use shardtree::storage::FileStore;
use shardtree::tree::{HandlerTable, ShardCodec, ShardId, TreeLevel};
use shardtree::value::FILE_KEY;
use shardtree::{Map, TreeError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct Harness {
    level: TreeLevel,
    debouncer: Debouncer,
    store: Arc<FileStore>,
    _temp: TempDir,
}

fn setup() -> Harness {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .folder(temp.path())
        .depth(0)
        .threshold(1)
        .build();
    let store = Arc::new(FileStore::open(&config, Reporter::default()).unwrap());
    let debouncer = Debouncer::start().unwrap();
    let files = Arc::new(FileTable::new(Arc::clone(&store), &debouncer, &config));
    let codec = Arc::new(ShardCodec::new(Arc::clone(&files), 0));
    let level = TreeLevel::open(ShardId::root(), files, codec, Arc::new(HandlerTable::new())).unwrap();
    Harness {
        level,
        debouncer,
        store,
        _temp: temp,
    }
}

fn object(pairs: &[(&str, Value)]) -> Value {
    Value::Map(pairs.iter().cloned().collect())
}

fn link_of(h: &Harness, key: &str) -> ShardId {
    match h.level.get(key).unwrap() {
        Some(Value::Link(node)) => ShardId::from_file(&node).unwrap(),
        other => panic!("expected a link under {key}, got {other:?}"),
    }
}

fn exists(h: &Harness, name: &str) -> bool {
    h.store.flush();
    h.store.locate(name).unwrap().exists()
}

// =============================================================================
// Literal Tests
// =============================================================================

#[test]
fn test_literal_set_get() {
    let h = setup();

    assert!(h.level.set("a", Value::from(1)).unwrap());
    assert!(h.level.set("s", Value::from("text")).unwrap());

    assert_eq!(h.level.get("a").unwrap(), Some(Value::Int(1)));
    assert_eq!(h.level.get("s").unwrap(), Some(Value::from("text")));
    assert_eq!(h.level.get("missing").unwrap(), None);
}

#[test]
fn test_keys_keep_insertion_order() {
    let h = setup();
    for key in ["z", "a", "m"] {
        h.level.set(key, Value::Null).unwrap();
    }
    h.level.set("a", Value::from(true)).unwrap();

    assert_eq!(h.level.keys().unwrap(), vec!["z", "a", "m"]);
}

#[test]
fn test_literal_delete() {
    let h = setup();
    h.level.set("a", Value::from(1)).unwrap();

    assert!(h.level.delete("a").unwrap());
    assert!(!h.level.delete("a").unwrap());
    assert!(h.level.keys().unwrap().is_empty());
}

// =============================================================================
// Nested Value Tests
// =============================================================================

#[test]
fn test_nested_value_is_forged_and_linked() {
    let h = setup();
    h.level.set("b", object(&[("c", Value::from(2))])).unwrap();

    let child = link_of(&h, "b");
    assert_eq!(
        h.level.index().get("b").unwrap(),
        Some(child.map_file())
    );
    assert!(exists(&h, &child.node_file()));
    assert!(exists(&h, &child.map_file()));

    let child_node = h.store.read_sync(&child.node_file()).unwrap();
    assert_eq!(child_node.read().get("c"), Some(&Value::Int(2)));
}

#[test]
fn test_index_keys_are_subset_of_node_keys() {
    let h = setup();
    h.level.set("lit", Value::from(1)).unwrap();
    h.level.set("obj", object(&[])).unwrap();

    let index = h.level.index().keys().unwrap();
    let node = h.level.keys().unwrap();
    assert_eq!(index, vec!["obj"]);
    assert!(index.iter().all(|k| node.contains(k)));
}

#[test]
fn test_overwrite_purges_previous_subtree() {
    let h = setup();
    h.level.set("b", object(&[("c", object(&[("d", Value::from(1))]))])).unwrap();
    let old = link_of(&h, "b");

    h.level.set("b", Value::from("flat")).unwrap();

    assert_eq!(h.level.get("b").unwrap(), Some(Value::from("flat")));
    assert_eq!(h.level.index().get("b").unwrap(), None);
    assert!(!exists(&h, &old.node_file()));
    assert!(!exists(&h, &old.map_file()));
}

#[test]
fn test_overwrite_with_new_object_replaces_not_merges() {
    let h = setup();
    h.level.set("b", object(&[("x", Value::from(1))])).unwrap();
    h.level.set("b", object(&[("y", Value::from(2))])).unwrap();

    let child = link_of(&h, "b");
    let data = h.store.read_sync(&child.node_file()).unwrap();
    let data = data.read();
    assert!(!data.contains_key("x"));
    assert_eq!(data.get("y"), Some(&Value::Int(2)));
}

#[test]
fn test_delete_purges_subtree() {
    let h = setup();
    h.level.set("a", Value::from(1)).unwrap();
    h.level.set("b", object(&[("c", Value::from(2))])).unwrap();
    let child = link_of(&h, "b");

    assert!(h.level.delete("b").unwrap());

    assert!(!exists(&h, &child.node_file()));
    assert!(!exists(&h, &child.map_file()));
    assert_eq!(h.level.keys().unwrap(), vec!["a"]);
    assert!(h.level.index().keys().unwrap().is_empty());
}

#[test]
fn test_forge_failure_leaves_key_unlinked() {
    let h = setup();
    h.level.set("k", object(&[("x", Value::from(1))])).unwrap();
    let old = link_of(&h, "k");
    h.store.flush();

    // A plain file where the node folder should be makes every forge fail
    let nodes = h._temp.path().join("nodes");
    std::fs::remove_dir_all(&nodes).unwrap();
    std::fs::write(&nodes, b"blocked").unwrap();

    assert!(!h.level.set("k", object(&[("y", Value::from(2))])).unwrap());

    assert_eq!(h.level.node().get("k").unwrap(), None);
    assert_eq!(h.level.index().get("k").unwrap(), None);
    assert!(!exists(&h, &old.map_file()));
    assert!(!exists(&h, &old.node_file()));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_reserved_key_is_refused() {
    let h = setup();
    assert!(matches!(
        h.level.set(FILE_KEY, Value::from(1)),
        Err(TreeError::ReservedKey(_))
    ));
    assert!(matches!(
        h.level.set("ok", object(&[(FILE_KEY, Value::from(1))])),
        Err(TreeError::ReservedKey(_))
    ));
}

#[test]
fn test_link_values_are_refused() {
    let h = setup();
    assert!(matches!(
        h.level.set("x", Value::Link("root.node".to_string())),
        Err(TreeError::InvalidValue(_))
    ));
    assert!(h.level.keys().unwrap().is_empty());
}

// =============================================================================
// Self-healing Tests
// =============================================================================

#[test]
fn test_get_restores_missing_index_link() {
    let h = setup();
    h.level.set("b", object(&[("c", Value::from(2))])).unwrap();
    let child = link_of(&h, "b");

    h.level.index().delete("b").unwrap();
    assert_eq!(h.level.index().get("b").unwrap(), None);

    link_of(&h, "b");
    assert_eq!(h.level.index().get("b").unwrap(), Some(child.map_file()));
}

#[test]
fn test_root_files_persist_after_flush() {
    let h = setup();
    h.level.set("a", Value::from(1)).unwrap();
    h.debouncer.drain();
    h.store.flush();
    h.store.clear_cache();

    let root = h.store.read_sync("root.node").unwrap();
    let expected: Map = [("a", 1)].into_iter().collect();
    assert_eq!(*root.read(), expected);
}
