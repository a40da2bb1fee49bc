//! File Store
//!
//! Maps logical structural-file names to physical paths and performs cached,
//! atomic, per-path ordered I/O on them.
//!
//! ## Concurrency:
//! - `caches`: one `Mutex<BoundedCache>` per category, shared with workers
//! - async actions: queued on the per-path `Pipeline`
//! - sync actions: run on the caller's thread, bypassing the pipeline;
//!   callers mixing both on one file use `settle()` first

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::cache::{BoundedCache, CacheStats};
use crate::config::{Config, Layout, RetryPolicy};
use crate::error::{Result, TreeError};
use crate::report::Reporter;
use crate::value::Map;

use super::codec;
use super::io;
use super::pipeline::{Pending, Pipeline};
use super::{shared, Category, SharedMap};

/// Lane used for maintenance work such as pruning
const MAINTENANCE_LANE: &str = "__maint__";

/// Cache occupancy per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub maps: CacheStats,
    pub nodes: CacheStats,
    pub flows: CacheStats,
}

/// State shared between the store handle and pipeline workers
struct Shared {
    maps: Mutex<BoundedCache<SharedMap>>,
    nodes: Mutex<BoundedCache<SharedMap>>,
    flows: Mutex<BoundedCache<SharedMap>>,
    reporter: Reporter,
    atomic: bool,
    retry: RetryPolicy,
}

impl Shared {
    fn cache(&self, category: Category) -> &Mutex<BoundedCache<SharedMap>> {
        match category {
            Category::Map => &self.maps,
            Category::Node => &self.nodes,
            Category::Flow => &self.flows,
        }
    }

    /// Load and decode a file, caching the result.
    ///
    /// `Ok(None)` means the file does not exist.
    fn load(&self, name: &str, category: Category, path: &Path) -> Result<Option<SharedMap>> {
        let bytes = match io::with_retry(self.retry, || io::read_file(path))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let map = codec::decode(name, &bytes)?;
        let size = bytes.len().saturating_sub(codec::HEADER_SIZE);
        let data = shared(map);
        self.cache(category).lock().set_sized(name, Arc::clone(&data), size);
        Ok(Some(data))
    }

    fn commit(&self, name: &str, path: &Path, bytes: &Bytes) -> bool {
        match io::with_retry(self.retry, || io::write_file(path, bytes, self.atomic)) {
            Ok(()) => {
                tracing::trace!(file = name, bytes = bytes.len(), "committed");
                true
            }
            Err(e) => {
                self.reporter.error(&TreeError::WriteFailed {
                    file: name.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    fn unlink(&self, name: &str, path: &Path) -> bool {
        match io::with_retry(self.retry, || io::remove_path(path)) {
            Ok(()) => true,
            Err(e) => {
                self.reporter.error(&TreeError::WriteFailed {
                    file: name.to_string(),
                    reason: format!("remove failed: {}", e),
                });
                false
            }
        }
    }
}

/// Resolves, caches and persists structural files
pub struct FileStore {
    base: PathBuf,
    layout: Layout,
    shared: Arc<Shared>,
    pipeline: Pipeline,
}

impl FileStore {
    /// Open the store, creating the base and category folders
    pub fn open(config: &Config, reporter: Reporter) -> Result<Self> {
        let base = if config.folder.is_absolute() {
            config.folder.clone()
        } else {
            std::env::current_dir()?.join(&config.folder)
        };

        fs::create_dir_all(&base)?;
        for category in Category::ALL {
            fs::create_dir_all(Self::category_dir(&base, config.layout, category))?;
        }

        let cache = |category: Category, budget: usize| {
            Mutex::new(
                BoundedCache::new(budget, [category.root_file()]).with_reporter(reporter.clone()),
            )
        };

        let shared = Arc::new(Shared {
            maps: cache(Category::Map, config.maps.memory_bytes()),
            nodes: cache(Category::Node, config.nodes.memory_bytes()),
            flows: cache(Category::Flow, config.flows.memory_bytes()),
            reporter: reporter.clone(),
            atomic: config.atomic,
            retry: config.retry,
        });

        tracing::debug!(folder = %base.display(), layout = ?config.layout, "file store opened");

        Ok(Self {
            base,
            layout: config.layout,
            shared,
            pipeline: Pipeline::new(config.io_threads),
        })
    }

    /// Absolute base folder
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Physical path of a logical file name
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        self.resolve(name).map(|(_, path)| path)
    }

    // =========================================================================
    // Sync API (caller's thread, bypasses the pipeline)
    // =========================================================================

    /// Read a file through the cache; `None` if missing or unreadable
    pub fn read_sync(&self, name: &str) -> Option<SharedMap> {
        let (category, path) = self.resolve_or_report(name)?;
        if let Some(hit) = self.shared.cache(category).lock().get(name) {
            return Some(hit);
        }
        match self.shared.load(name, category, &path) {
            Ok(data) => data,
            Err(e) => {
                self.shared.reporter.error(&e);
                None
            }
        }
    }

    /// Cache and persist `data` immediately
    pub fn write_sync(&self, name: &str, data: &SharedMap) -> bool {
        let Some((category, path)) = self.resolve_or_report(name) else {
            return false;
        };
        let Some(bytes) = self.encode_and_cache(name, category, data) else {
            return false;
        };
        self.shared.commit(name, &path, &bytes)
    }

    /// Write a plain map; convenience over `write_sync`
    pub fn write_map_sync(&self, name: &str, map: Map) -> bool {
        self.write_sync(name, &shared(map))
    }

    /// Evict and delete a file immediately
    pub fn remove_sync(&self, name: &str) -> bool {
        let Some((category, path)) = self.resolve_or_report(name) else {
            return false;
        };
        self.shared.cache(category).lock().delete(name);
        self.shared.unlink(name, &path)
    }

    /// Whether a file is cached or present on disk
    pub fn exists_sync(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok((category, path)) => {
                self.shared.cache(category).lock().has(name) || path.exists()
            }
            Err(_) => false,
        }
    }

    // =========================================================================
    // Async API (queued on the file's pipeline)
    // =========================================================================

    /// Read a file; cache hits complete immediately
    pub fn read(&self, name: &str) -> Pending<Option<SharedMap>> {
        let Some((category, path)) = self.resolve_or_report(name) else {
            return Pending::ready(None);
        };
        if let Some(hit) = self.shared.cache(category).lock().get(name) {
            return Pending::ready(Some(hit));
        }

        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.pipeline.submit(path.clone(), move || {
            match shared.load(&name, category, &path) {
                Ok(data) => data,
                Err(e) => {
                    shared.reporter.error(&e);
                    None
                }
            }
        })
    }

    /// Cache `data` now and persist a snapshot of it in pipeline order
    pub fn write(&self, name: &str, data: &SharedMap) -> Pending<bool> {
        let Some((category, path)) = self.resolve_or_report(name) else {
            return Pending::ready(false);
        };
        let Some(bytes) = self.encode_and_cache(name, category, data) else {
            return Pending::ready(false);
        };

        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.pipeline
            .submit(path.clone(), move || shared.commit(&name, &path, &bytes))
    }

    /// Evict now and delete in pipeline order
    pub fn remove(&self, name: &str) -> Pending<bool> {
        let Some((category, path)) = self.resolve_or_report(name) else {
            return Pending::ready(false);
        };
        self.shared.cache(category).lock().delete(name);

        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.pipeline
            .submit(path.clone(), move || shared.unlink(&name, &path))
    }

    /// Existence check ordered after every queued action on the file
    pub fn exists(&self, name: &str) -> Pending<bool> {
        let Ok((category, path)) = self.resolve(name) else {
            return Pending::ready(false);
        };
        if self.shared.cache(category).lock().has(name) {
            return Pending::ready(true);
        }
        self.pipeline.submit(path.clone(), move || path.exists())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Block until every queued action has completed
    pub fn flush(&self) {
        self.pipeline.flush();
    }

    /// Block until the queued actions of one file have completed
    pub fn settle(&self, name: &str) {
        if let Ok((_, path)) = self.resolve(name) {
            self.pipeline.settle(&path);
        }
    }

    /// Remove empty shard subdirectories below every category folder.
    ///
    /// Resolves to the number of directories removed.
    pub fn prune(&self) -> Pending<usize> {
        let roots: Vec<PathBuf> = match self.layout {
            Layout::Split => Category::ALL
                .into_iter()
                .map(|c| Self::category_dir(&self.base, self.layout, c))
                .collect(),
            Layout::Combined => vec![Self::category_dir(&self.base, self.layout, Category::Node)],
        };

        let reporter = self.shared.reporter.clone();
        self.pipeline
            .submit(self.base.join(MAINTENANCE_LANE), move || {
                let mut removed = 0;
                for root in &roots {
                    match io::prune_empty_dirs(root) {
                        Ok(n) => removed += n,
                        Err(e) => reporter.error(&TreeError::Io(e)),
                    }
                }
                tracing::debug!(removed, "pruned empty shard directories");
                removed
            })
    }

    /// Cache occupancy per category
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            maps: self.shared.maps.lock().stats(),
            nodes: self.shared.nodes.lock().stats(),
            flows: self.shared.flows.lock().stats(),
        }
    }

    /// Whether a file is currently cached
    pub fn is_cached(&self, name: &str) -> bool {
        Category::of(name).is_some_and(|c| self.shared.cache(c).lock().has(name))
    }

    /// Drop every evictable cache entry
    pub fn clear_cache(&self) {
        for category in Category::ALL {
            self.shared.cache(category).lock().clear();
        }
    }

    pub fn reporter(&self) -> &Reporter {
        &self.shared.reporter
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn category_dir(base: &Path, layout: Layout, category: Category) -> PathBuf {
        match layout {
            Layout::Split => base.join(category.folder()),
            Layout::Combined => base.join("data"),
        }
    }

    /// Validate a logical name and compute its category and physical path
    fn resolve(&self, name: &str) -> Result<(Category, PathBuf)> {
        let invalid = || TreeError::InvalidFileName(name.to_string());
        let category = Category::of(name).ok_or_else(invalid)?;

        let relative = Path::new(name);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(invalid());
        }

        if name == category.root_file() {
            return Ok((category, self.base.join(name)));
        }
        Ok((
            category,
            Self::category_dir(&self.base, self.layout, category).join(relative),
        ))
    }

    fn resolve_or_report(&self, name: &str) -> Option<(Category, PathBuf)> {
        match self.resolve(name) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                self.shared.reporter.error(&e);
                None
            }
        }
    }

    fn encode_and_cache(&self, name: &str, category: Category, data: &SharedMap) -> Option<Bytes> {
        let bytes = match codec::encode(&data.read()) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.shared.reporter.error(&e);
                return None;
            }
        };
        let size = bytes.len() - codec::HEADER_SIZE;
        let mut cache = self.shared.cache(category).lock();
        if !cache.set_sized(name, Arc::clone(data), size) {
            // The previous payload must not outlive this write
            cache.delete(name);
        }
        Some(bytes)
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("base", &self.base)
            .field("layout", &self.layout)
            .field("active_lanes", &self.pipeline.active_lanes())
            .finish()
    }
}
