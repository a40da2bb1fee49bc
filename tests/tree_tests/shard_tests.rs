//! Tests for ShardCodec
//!
//! These tests verify:
//! - Id generation with and without shard folders
//! - Forge writes children before parents and links them
//! - Purge removes a whole subtree, deepest first
//! - Purge is idempotent and never touches the root

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use shardtree::config::Config;
use shardtree::file::{Debouncer, FileTable};
use shardtree::report::Reporter;
use shardtree::storage::FileStore;
use shardtree::tree::{ShardCodec, ShardId};
use shardtree::value::FILE_KEY;
use shardtree::{Map, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct Harness {
    codec: ShardCodec,
    files: Arc<FileTable>,
    _debouncer: Debouncer,
    store: Arc<FileStore>,
    _temp: TempDir,
}

fn setup(depth: usize) -> Harness {
    let temp = TempDir::new().unwrap();
    let config = Config::builder().folder(temp.path()).depth(depth).build();
    let store = Arc::new(FileStore::open(&config, Reporter::default()).unwrap());
    let debouncer = Debouncer::start().unwrap();
    let files = Arc::new(FileTable::new(Arc::clone(&store), &debouncer, &config));
    let codec = ShardCodec::new(Arc::clone(&files), depth);
    Harness {
        codec,
        files,
        _debouncer: debouncer,
        store,
        _temp: temp,
    }
}

fn nested() -> Map {
    let inner: Map = [("e", Value::from(3))].into_iter().collect();
    [
        ("c", Value::from(2)),
        ("d", Value::Map(inner)),
        ("tags", Value::List(vec!["x".into()])),
    ]
    .into_iter()
    .collect()
}

fn path_of(h: &Harness, name: &str) -> PathBuf {
    h.store.locate(name).unwrap()
}

fn read(h: &Harness, name: &str) -> Map {
    h.store.read_sync(name).unwrap().read().clone()
}

// =============================================================================
// Id Tests
// =============================================================================

#[test]
fn test_gen_id_uses_configured_depth() {
    let h = setup(3);
    let id = h.codec.gen_id();
    let (folder, token) = id.as_str().split_once('/').unwrap();

    assert_eq!(folder.len(), 3);
    assert_eq!(&token[..3], folder);
}

#[test]
fn test_gen_id_without_depth_is_flat() {
    let h = setup(0);
    assert!(!h.codec.gen_id().as_str().contains('/'));
}

// =============================================================================
// Forge Tests
// =============================================================================

#[test]
fn test_forge_writes_linked_shards() {
    let h = setup(2);
    let id = h.codec.forge(&nested()).unwrap();

    assert!(path_of(&h, &id.node_file()).exists());
    assert!(path_of(&h, &id.map_file()).exists());

    let node = read(&h, &id.node_file());
    assert_eq!(node.get("c"), Some(&Value::Int(2)));
    assert_eq!(node.get("tags"), Some(&Value::List(vec!["x".into()])));

    let child_node = node.get("d").and_then(Value::as_link).unwrap().to_string();
    let child = ShardId::from_file(&child_node).unwrap();
    assert_eq!(read(&h, &child_node).get("e"), Some(&Value::Int(3)));

    let index = read(&h, &id.map_file());
    assert_eq!(index.get(FILE_KEY), Some(&Value::from(id.map_file())));
    assert_eq!(index.get("d"), Some(&Value::from(child.map_file())));
    assert!(!index.contains_key("c"));
}

#[test]
fn test_forge_places_files_in_shard_folders() {
    let h = setup(2);
    let id = h.codec.forge(&nested()).unwrap();
    let prefix = &id.as_str()[..2];

    let node_path = path_of(&h, &id.node_file());
    assert_eq!(
        node_path.parent().unwrap().file_name().unwrap().to_string_lossy(),
        prefix
    );
}

#[test]
fn test_forge_failure_returns_none() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder().folder(temp.path()).depth(1).build();
    let store = Arc::new(FileStore::open(&config, Reporter::default()).unwrap());
    let debouncer = Debouncer::start().unwrap();
    let files = Arc::new(FileTable::new(Arc::clone(&store), &debouncer, &config));
    let codec = ShardCodec::new(files, 1);

    // A plain file where the shard folder tree should be makes every write fail
    std::fs::remove_dir_all(temp.path().join("nodes")).unwrap();
    std::fs::write(temp.path().join("nodes"), b"blocked").unwrap();

    assert!(codec.forge(&nested()).is_none());
}

// =============================================================================
// Purge Tests
// =============================================================================

#[test]
fn test_purge_removes_whole_subtree() {
    let h = setup(2);
    let id = h.codec.forge(&nested()).unwrap();
    let node = read(&h, &id.node_file());
    let child = ShardId::from_file(node.get("d").and_then(Value::as_link).unwrap()).unwrap();

    let purged = h.codec.purge(&id.map_file());
    h.store.flush();

    assert_eq!(purged, vec![child.clone(), id.clone()]);
    for shard in [&id, &child] {
        assert!(!path_of(&h, &shard.node_file()).exists());
        assert!(!path_of(&h, &shard.map_file()).exists());
    }
}

#[test]
fn test_purge_is_idempotent() {
    let h = setup(2);
    let id = h.codec.forge(&nested()).unwrap();

    h.codec.purge(&id.map_file());
    h.store.flush();
    h.codec.purge(&id.map_file());
    h.store.flush();

    assert!(!path_of(&h, &id.map_file()).exists());
    assert!(h.codec.purge("never/forged.map").len() <= 1);
    assert!(h.codec.purge("not-a-map.node").is_empty());
}

#[test]
fn test_purge_fragment_without_file_recurses() {
    let h = setup(0);
    let a = h.codec.forge(&nested()).unwrap();
    let b = h.codec.forge(&Map::new()).unwrap();

    let fragment: Map = [("a", a.map_file()), ("b", b.map_file())]
        .into_iter()
        .collect();
    h.codec.purge_fragment(&fragment);
    h.store.flush();

    assert!(!path_of(&h, &a.node_file()).exists());
    assert!(!path_of(&h, &b.node_file()).exists());
}

#[test]
fn test_purge_never_removes_root() {
    let h = setup(0);
    let child = h.codec.forge(&Map::new()).unwrap();
    h.store.write_map_sync("root.node", Map::new());
    let root: Map = [(FILE_KEY, "root.map".to_string()), ("x", child.map_file())]
        .into_iter()
        .collect();
    h.store.write_map_sync("root.map", root);

    let purged = h.codec.purge("root.map");
    h.store.flush();

    assert_eq!(purged, vec![child]);
    assert!(path_of(&h, "root.map").exists());
    assert!(path_of(&h, "root.node").exists());
}

#[test]
fn test_purge_notifies_listener() {
    let h = setup(0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let codec = ShardCodec::new(Arc::clone(&h.files), 0)
        .with_listener(Arc::new(move |id: &ShardId| sink.lock().push(id.clone())));

    let id = codec.forge(&nested()).unwrap();
    codec.purge(&id.map_file());

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen.last(), Some(&id));
}
