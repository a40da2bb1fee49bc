//! Debounced file handles

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{CategoryConfig, Config};
use crate::error::{Result, TreeError};
use crate::storage::{shared, Category, FileStore, Pending, SharedMap};
use crate::value::Map;

use super::debouncer::{Debouncer, Flushable, Timers};

/// When buffered mutations reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Saves that force a write
    pub threshold: usize,
    /// Idle time after the last save before a forced write
    pub delay: Duration,
}

impl FlushPolicy {
    pub fn new(threshold: usize, delay: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            delay,
        }
    }
}

impl From<&CategoryConfig> for FlushPolicy {
    fn from(config: &CategoryConfig) -> Self {
        Self::new(config.threshold, config.debounce())
    }
}

#[derive(Default)]
struct Buffer {
    /// Saves since the last write
    count: usize,
    /// Bumped on every write or discard; timers armed for older generations
    /// are stale
    generation: u64,
    /// A timer for the current generation is in the heap
    armed: bool,
    /// Idle deadline of the latest save; the armed timer re-checks it
    deadline: Option<Instant>,
    /// Payload handed out since the last write
    live: Option<SharedMap>,
}

struct FileState {
    name: String,
    store: Arc<FileStore>,
    timers: Arc<Timers>,
    policy: FlushPolicy,
    buffer: Mutex<Buffer>,
    writes: AtomicU64,
}

impl FileState {
    fn current(&self, buffer: &Buffer) -> Result<SharedMap> {
        if let Some(live) = &buffer.live {
            return Ok(Arc::clone(live));
        }

        self.store.settle(&self.name);
        if let Some(data) = self.store.read_sync(&self.name) {
            return Ok(data);
        }
        if self.store.exists_sync(&self.name) {
            return Err(TreeError::Unreadable(self.name.clone()));
        }

        tracing::debug!(file = %self.name, "creating empty file");
        let data = shared(Map::new());
        let _ = self.store.write(&self.name, &data);
        Ok(data)
    }

    fn commit(&self, buffer: &mut Buffer) -> Result<Pending<bool>> {
        let data = self.current(buffer)?;
        buffer.count = 0;
        buffer.generation += 1;
        buffer.armed = false;
        buffer.deadline = None;
        buffer.live = None;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(self.store.write(&self.name, &data))
    }
}

impl Flushable for FileState {
    fn fire(&self, generation: u64, force: bool) -> Option<Instant> {
        let mut buffer = self.buffer.lock();
        if !buffer.armed || buffer.generation != generation {
            return None;
        }
        if !force {
            // Saved again since the timer was armed
            if let Some(deadline) = buffer.deadline.filter(|d| *d > Instant::now()) {
                return Some(deadline);
            }
        }
        tracing::trace!(file = %self.name, "idle flush");
        if let Err(e) = self.commit(&mut buffer) {
            self.store.reporter().error(&e);
        }
        None
    }
}

/// One logical file with batched, time-debounced writes.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct DebouncedFile {
    state: Arc<FileState>,
}

impl DebouncedFile {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Live payload; an absent file is created empty on first access.
    ///
    /// The payload stays attached to this file until the next write, so
    /// mutations made through it survive cache eviction.
    pub fn data(&self) -> Result<SharedMap> {
        let mut buffer = self.state.buffer.lock();
        let data = self.state.current(&buffer)?;
        buffer.live = Some(Arc::clone(&data));
        Ok(data)
    }

    /// Record a mutation of `data()`.
    ///
    /// Writes immediately when `force` is set or the save count reaches the
    /// threshold and returns the pending write; otherwise pushes back the idle
    /// deadline and returns `None`. At most one timer per file is armed at a
    /// time.
    pub fn save(&self, force: bool) -> Result<Option<Pending<bool>>> {
        let mut buffer = self.state.buffer.lock();
        if !force {
            buffer.count += 1;
        }
        if force || buffer.count >= self.state.policy.threshold {
            return self.state.commit(&mut buffer).map(Some);
        }

        if buffer.live.is_none() {
            let data = self.state.current(&buffer)?;
            buffer.live = Some(data);
        }
        buffer.deadline = Some(Instant::now() + self.state.policy.delay);
        if buffer.armed {
            return Ok(None);
        }
        buffer.armed = true;
        let generation = buffer.generation;
        drop(buffer);

        let target: Arc<dyn Flushable> = self.state.clone();
        self.state
            .timers
            .schedule(self.state.policy.delay, target, generation);
        Ok(None)
    }

    /// Whether mutations are waiting for a write
    pub fn is_dirty(&self) -> bool {
        self.state.buffer.lock().armed
    }

    /// Saves buffered since the last write
    pub fn pending_saves(&self) -> usize {
        self.state.buffer.lock().count
    }

    /// Writes this file has issued to the store
    pub fn writes_issued(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }

    fn discard(&self) {
        let mut buffer = self.state.buffer.lock();
        buffer.count = 0;
        buffer.generation += 1;
        buffer.armed = false;
        buffer.deadline = None;
        buffer.live = None;
    }
}

impl std::fmt::Debug for DebouncedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedFile")
            .field("name", &self.state.name)
            .field("policy", &self.state.policy)
            .finish()
    }
}

/// Registry of open files; at most one live state per name
pub struct FileTable {
    store: Arc<FileStore>,
    timers: Arc<Timers>,
    maps: FlushPolicy,
    nodes: FlushPolicy,
    flows: FlushPolicy,
    open: Mutex<HashMap<String, Weak<FileState>>>,
}

impl FileTable {
    pub fn new(store: Arc<FileStore>, debouncer: &Debouncer, config: &Config) -> Self {
        Self {
            store,
            timers: debouncer.timers(),
            maps: FlushPolicy::from(&config.maps),
            nodes: FlushPolicy::from(&config.nodes),
            flows: FlushPolicy::from(&config.flows),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    /// Flush policy applied to files of a category
    pub fn policy(&self, category: Category) -> FlushPolicy {
        match category {
            Category::Map => self.maps,
            Category::Node => self.nodes,
            Category::Flow => self.flows,
        }
    }

    /// Handle for `name`, sharing state with any handle still alive
    pub fn open(&self, name: &str) -> Result<DebouncedFile> {
        let category =
            Category::of(name).ok_or_else(|| TreeError::InvalidFileName(name.to_string()))?;

        let mut open = self.open.lock();
        if let Some(state) = open.get(name).and_then(Weak::upgrade) {
            return Ok(DebouncedFile { state });
        }

        let state = Arc::new(FileState {
            name: name.to_string(),
            store: Arc::clone(&self.store),
            timers: Arc::clone(&self.timers),
            policy: self.policy(category),
            buffer: Mutex::new(Buffer::default()),
            writes: AtomicU64::new(0),
        });
        if open.len() >= 64 && open.len().is_power_of_two() {
            open.retain(|_, weak| weak.strong_count() > 0);
        }
        open.insert(name.to_string(), Arc::downgrade(&state));
        Ok(DebouncedFile { state })
    }

    /// Current payload without creating the file; `None` if it does not exist
    pub fn snapshot(&self, name: &str) -> Option<Map> {
        let live = self
            .open
            .lock()
            .get(name)
            .and_then(Weak::upgrade)
            .and_then(|state| {
                let live = state.buffer.lock().live.clone();
                live
            });
        if let Some(data) = live {
            return Some(data.read().clone());
        }
        self.store.settle(name);
        self.store.read_sync(name).map(|data| data.read().clone())
    }

    /// Cancel buffered mutations of a file that is being deleted
    pub fn discard(&self, name: &str) {
        let live = self.open.lock().get(name).and_then(Weak::upgrade);
        if let Some(state) = live {
            DebouncedFile { state }.discard();
            tracing::trace!(file = name, "discarded pending writes");
        }
    }

    /// Number of names with a live state
    pub fn open_count(&self) -> usize {
        self.open
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for FileTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTable")
            .field("open", &self.open_count())
            .finish()
    }
}
