//! Tests for FileStore
//!
//! These tests verify:
//! - Name resolution by category, layout and shard folder
//! - Sync and async read/write/remove/exists
//! - Per-path ordering of async writes
//! - Corruption detection and error reporting
//! - Pruning of empty shard directories

use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use shardtree::config::{Config, Layout};
use shardtree::report::Reporter;
use shardtree::storage::{shared, FileStore};
use shardtree::{Map, TreeError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, FileStore) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().folder(temp_dir.path()).build();
    let store = FileStore::open(&config, Reporter::default()).unwrap();
    (temp_dir, store)
}

fn setup_reporting_store() -> (TempDir, FileStore, Arc<Mutex<Vec<String>>>) {
    let temp_dir = TempDir::new().unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let config = Config::builder()
        .folder(temp_dir.path())
        .on_error(move |err| sink.lock().push(err.to_string()))
        .build();
    let reporter = Reporter::new(config.on_error.clone());
    let store = FileStore::open(&config, reporter).unwrap();
    (temp_dir, store, errors)
}

fn map_of(pairs: &[(&str, i64)]) -> Map {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_open_creates_category_folders() {
    let (temp, _store) = setup_temp_store();

    assert!(temp.path().join("maps").is_dir());
    assert!(temp.path().join("nodes").is_dir());
    assert!(temp.path().join("flows").is_dir());
}

#[test]
fn test_locate_by_category() {
    let (temp, store) = setup_temp_store();
    let base = store.base().to_path_buf();

    assert_eq!(store.locate("root.node").unwrap(), base.join("root.node"));
    assert_eq!(
        store.locate("AB/ABCDEF.map").unwrap(),
        base.join("maps").join("AB").join("ABCDEF.map")
    );
    assert_eq!(
        store.locate("ABCDEF.flow").unwrap(),
        base.join("flows").join("ABCDEF.flow")
    );
    assert_eq!(base, temp.path());
}

#[test]
fn test_combined_layout_uses_one_folder() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .folder(temp.path())
        .layout(Layout::Combined)
        .build();
    let store = FileStore::open(&config, Reporter::default()).unwrap();

    assert!(temp.path().join("data").is_dir());
    assert_eq!(
        store.locate("AB/ABCDEF.node").unwrap(),
        store.base().join("data").join("AB").join("ABCDEF.node")
    );
}

#[test]
fn test_invalid_names_are_rejected() {
    let (_temp, store) = setup_temp_store();

    for name in ["notes.txt", "../escape.node", "/abs.node", ".node", ""] {
        assert!(
            matches!(store.locate(name), Err(TreeError::InvalidFileName(_))),
            "{name} should be rejected"
        );
    }
    assert!(!store.write_map_sync("../escape.node", Map::new()));
}

// =============================================================================
// Sync API Tests
// =============================================================================

#[test]
fn test_sync_write_read_remove() {
    let (_temp, store) = setup_temp_store();
    let data = map_of(&[("a", 1), ("b", 2)]);

    assert!(store.write_map_sync("AB/ABCD.node", data.clone()));
    assert!(store.exists_sync("AB/ABCD.node"));
    assert!(store.locate("AB/ABCD.node").unwrap().exists());

    let read = store.read_sync("AB/ABCD.node").unwrap();
    assert_eq!(*read.read(), data);

    assert!(store.remove_sync("AB/ABCD.node"));
    assert!(!store.exists_sync("AB/ABCD.node"));
    assert!(store.read_sync("AB/ABCD.node").is_none());
}

#[test]
fn test_read_missing_file_is_none() {
    let (_temp, store) = setup_temp_store();
    assert!(store.read_sync("FFFF.node").is_none());
    assert!(!store.exists_sync("FFFF.node"));
}

#[test]
fn test_read_survives_cache_clear() {
    let (_temp, store) = setup_temp_store();
    store.write_map_sync("CAFE.map", map_of(&[("x", 9)]));

    store.clear_cache();
    assert!(!store.is_cached("CAFE.map"));

    let read = store.read_sync("CAFE.map").unwrap();
    assert_eq!(read.read().get("x"), Some(&Value::Int(9)));
    assert!(store.is_cached("CAFE.map"));
}

#[test]
fn test_atomic_write_leaves_no_temp_files() {
    let (_temp, store) = setup_temp_store();
    for i in 0..5 {
        store.write_map_sync("AA/AAAA.node", map_of(&[("i", i)]));
    }
    let dir = store.locate("AA/AAAA.node").unwrap();
    let entries: Vec<_> = fs::read_dir(dir.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["AAAA.node".to_string()]);
}

#[test]
fn test_non_atomic_mode_writes_in_place() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder().folder(temp.path()).atomic(false).build();
    let store = FileStore::open(&config, Reporter::default()).unwrap();

    assert!(store.write_map_sync("BEEF.node", map_of(&[("v", 1)])));
    store.clear_cache();
    let read = store.read_sync("BEEF.node").unwrap();
    assert_eq!(read.read().get("v"), Some(&Value::Int(1)));
}

// =============================================================================
// Async API Tests
// =============================================================================

#[test]
fn test_async_write_then_read() {
    let (_temp, store) = setup_temp_store();
    let data = shared(map_of(&[("k", 5)]));

    assert_eq!(store.write("ABCD.node", &data).wait(), Some(true));
    store.clear_cache();

    let read = store.read("ABCD.node").wait().unwrap().unwrap();
    assert_eq!(read.read().get("k"), Some(&Value::Int(5)));
    assert_eq!(store.exists("ABCD.node").wait(), Some(true));
}

#[test]
fn test_same_path_writes_commit_in_order() {
    let (_temp, store) = setup_temp_store();

    let tickets: Vec<_> = (0..50)
        .map(|i| store.write("ORDER.node", &shared(map_of(&[("v", i)]))))
        .collect();
    for ticket in tickets {
        assert_eq!(ticket.wait(), Some(true));
    }

    store.clear_cache();
    let read = store.read_sync("ORDER.node").unwrap();
    assert_eq!(read.read().get("v"), Some(&Value::Int(49)));
}

#[test]
fn test_remove_after_write_is_ordered() {
    let (_temp, store) = setup_temp_store();
    let _ = store.write("GONE.node", &shared(map_of(&[("v", 1)])));
    let removed = store.remove("GONE.node");

    assert_eq!(removed.wait(), Some(true));
    assert!(!store.locate("GONE.node").unwrap().exists());
    assert_eq!(store.exists("GONE.node").wait(), Some(false));
}

#[test]
fn test_flush_drains_every_pipeline() {
    let (_temp, store) = setup_temp_store();
    for i in 0..20 {
        let _ = store.write(&format!("F{:02}.node", i), &shared(map_of(&[("i", i)])));
    }
    store.flush();

    for i in 0..20 {
        assert!(store.locate(&format!("F{:02}.node", i)).unwrap().exists());
    }
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_corrupt_file_is_reported() {
    let (_temp, store, errors) = setup_reporting_store();
    let path = store.locate("BAD.node").unwrap();
    fs::write(&path, b"STRE\x01\x00garbage-garbage").unwrap();

    assert!(store.read_sync("BAD.node").is_none());
    assert!(store.exists_sync("BAD.node"));
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("BAD.node"));
}

// =============================================================================
// Prune Tests
// =============================================================================

#[test]
fn test_prune_removes_only_empty_shard_dirs() {
    let (_temp, store) = setup_temp_store();
    store.write_map_sync("AA/AA01.node", Map::new());
    store.write_map_sync("BB/BB01.node", Map::new());
    store.remove_sync("AA/AA01.node");

    let removed = store.prune().wait().unwrap();

    let nodes = store.base().join("nodes");
    assert_eq!(removed, 1);
    assert!(!nodes.join("AA").exists());
    assert!(nodes.join("BB").exists());
    assert!(nodes.is_dir());
    assert!(store.base().join("maps").is_dir());
}

#[test]
fn test_stats_report_per_category() {
    let (_temp, store) = setup_temp_store();
    store.write_map_sync("root.node", map_of(&[("a", 1)]));
    store.write_map_sync("X1.node", map_of(&[("a", 1)]));
    store.write_map_sync("X1.map", Map::new());

    let stats = store.stats();
    assert_eq!(stats.nodes.pinned, 1);
    assert_eq!(stats.nodes.count, 1);
    assert_eq!(stats.maps.count, 1);
    assert_eq!(stats.flows.count, 0);
    assert_eq!(stats.nodes.limit, 44 * 1024 * 1024);
}
