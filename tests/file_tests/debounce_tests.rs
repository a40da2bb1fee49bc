//! Tests for DebouncedFile
//!
//! These tests verify:
//! - Auto-creation of missing files
//! - Threshold batching: floor(N / T) forced writes for N saves
//! - Idle timers flushing the remainder
//! - Forced saves always writing
//! - One armed timer per file under repeated saves
//! - One shared state per open file name

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shardtree::config::{CategoryConfig, Config};
use shardtree::file::{Debouncer, FileTable};
use shardtree::report::Reporter;
use shardtree::storage::FileStore;
use shardtree::{TreeError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

// Fields drop in order: pending timers fire before the folder is removed
struct Harness {
    files: FileTable,
    debouncer: Debouncer,
    store: Arc<FileStore>,
    _temp: TempDir,
}

fn setup(threshold: usize, debounce_ms: u64) -> Harness {
    let temp = TempDir::new().unwrap();
    let category = CategoryConfig::new(1.0, threshold, debounce_ms);
    let config = Config::builder()
        .folder(temp.path())
        .maps(category)
        .nodes(category)
        .flows(category)
        .build();
    let store = Arc::new(FileStore::open(&config, Reporter::default()).unwrap());
    let debouncer = Debouncer::start().unwrap();
    let files = FileTable::new(Arc::clone(&store), &debouncer, &config);
    Harness {
        files,
        debouncer,
        store,
        _temp: temp,
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn read_back(h: &Harness, name: &str, key: &str) -> Option<Value> {
    h.store.flush();
    h.store.clear_cache();
    let data = h.store.read_sync(name)?;
    let value = data.read().get(key).cloned();
    value
}

// =============================================================================
// Data Access Tests
// =============================================================================

#[test]
fn test_data_creates_missing_file() {
    let h = setup(10, 60_000);
    let file = h.files.open("NEW.node").unwrap();

    let data = file.data().unwrap();
    assert!(data.read().is_empty());

    h.store.flush();
    assert!(h.store.locate("NEW.node").unwrap().exists());
}

#[test]
fn test_data_reflects_unsaved_mutations() {
    let h = setup(10, 60_000);
    let file = h.files.open("LIVE.node").unwrap();

    file.data().unwrap().write().insert("k", 1);
    file.save(false).unwrap();
    h.store.clear_cache();

    assert_eq!(file.data().unwrap().read().get("k"), Some(&Value::Int(1)));
}

#[test]
fn test_unreadable_file_is_an_error() {
    let h = setup(10, 60_000);
    let path = h.store.locate("BAD.node").unwrap();
    std::fs::write(path, b"not a structural file").unwrap();

    let file = h.files.open("BAD.node").unwrap();
    assert!(matches!(file.data(), Err(TreeError::Unreadable(_))));
}

#[test]
fn test_open_rejects_unknown_category() {
    let h = setup(10, 60_000);
    assert!(matches!(
        h.files.open("x.txt"),
        Err(TreeError::InvalidFileName(_))
    ));
}

// =============================================================================
// Batching Tests
// =============================================================================

#[test]
fn test_threshold_coalesces_writes() {
    let h = setup(3, 60_000);
    let file = h.files.open("BATCH.node").unwrap();

    for i in 0..10 {
        file.data().unwrap().write().insert("i", i);
        file.save(false).unwrap();
    }

    // floor(10 / 3) forced writes, one save still buffered
    assert_eq!(file.writes_issued(), 3);
    assert_eq!(file.pending_saves(), 1);
    assert!(file.is_dirty());
}

#[test]
fn test_threshold_write_returns_pending() {
    let h = setup(2, 60_000);
    let file = h.files.open("TICKET.node").unwrap();

    file.data().unwrap().write().insert("a", 1);
    assert!(file.save(false).unwrap().is_none());
    file.data().unwrap().write().insert("b", 2);
    let pending = file.save(false).unwrap().expect("threshold reached");

    assert_eq!(pending.wait(), Some(true));
    assert_eq!(read_back(&h, "TICKET.node", "b"), Some(Value::Int(2)));
}

#[test]
fn test_idle_timer_flushes_remainder() {
    let h = setup(100, 30);
    let file = h.files.open("IDLE.node").unwrap();

    file.data().unwrap().write().insert("v", "late");
    file.save(false).unwrap();
    assert_eq!(file.writes_issued(), 0);

    assert!(wait_for(|| file.writes_issued() == 1));
    assert!(!file.is_dirty());
    assert_eq!(read_back(&h, "IDLE.node", "v"), Some(Value::from("late")));
}

#[test]
fn test_rearming_delays_the_timer() {
    let h = setup(100, 400);
    let file = h.files.open("REARM.node").unwrap();

    for i in 0..5 {
        file.data().unwrap().write().insert("i", i);
        file.save(false).unwrap();
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(file.writes_issued(), 0);

    assert!(wait_for(|| file.writes_issued() == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(file.writes_issued(), 1);
}

#[test]
fn test_repeated_saves_arm_one_timer() {
    let h = setup(1000, 60_000);
    let file = h.files.open("BURST.node").unwrap();

    for i in 0..200 {
        file.data().unwrap().write().insert("i", i);
        file.save(false).unwrap();
    }

    assert_eq!(h.debouncer.pending(), 1);
    assert_eq!(h.debouncer.drain(), 1);
    assert_eq!(file.writes_issued(), 1);
    assert_eq!(read_back(&h, "BURST.node", "i"), Some(Value::Int(199)));
}

#[test]
fn test_forced_save_always_writes() {
    let h = setup(100, 60_000);
    let file = h.files.open("FORCE.node").unwrap();

    let first = file.save(true).unwrap().expect("forced write");
    let second = file.save(true).unwrap().expect("forced write");

    assert_eq!(first.wait(), Some(true));
    assert_eq!(second.wait(), Some(true));
    assert_eq!(file.writes_issued(), 2);
}

#[test]
fn test_drain_forces_armed_timers() {
    let h = setup(100, 60_000);
    let file = h.files.open("DRAIN.node").unwrap();
    file.data().unwrap().write().insert("x", true);
    file.save(false).unwrap();

    h.debouncer.drain();

    assert_eq!(file.writes_issued(), 1);
    assert_eq!(read_back(&h, "DRAIN.node", "x"), Some(Value::Bool(true)));
}

// =============================================================================
// File Table Tests
// =============================================================================

#[test]
fn test_open_shares_live_state() {
    let h = setup(100, 60_000);
    let a = h.files.open("SHARED.node").unwrap();
    let b = h.files.open("SHARED.node").unwrap();

    a.data().unwrap().write().insert("k", 1);
    a.save(false).unwrap();

    assert_eq!(b.pending_saves(), 1);
    assert_eq!(b.data().unwrap().read().get("k"), Some(&Value::Int(1)));
    assert_eq!(h.files.open_count(), 1);
}

#[test]
fn test_discard_cancels_pending_write() {
    let h = setup(100, 60_000);
    let file = h.files.open("DROP.node").unwrap();
    file.data().unwrap().write().insert("k", 1);
    file.save(false).unwrap();

    h.files.discard("DROP.node");
    h.debouncer.drain();

    assert_eq!(file.writes_issued(), 0);
    assert!(!file.is_dirty());
}

#[test]
fn test_snapshot_does_not_create_files() {
    let h = setup(100, 60_000);
    assert!(h.files.snapshot("NOPE.map").is_none());
    h.store.flush();
    assert!(!h.store.locate("NOPE.map").unwrap().exists());
}
