//! Engine Module
//!
//! Top-level handle that wires every component together.
//!
//! ## Responsibilities
//! - Validate configuration before touching the disk
//! - Own the file store, the debounce timer thread and the façade memo
//! - Expose the root level and path navigation
//! - Drain debounced writes and I/O pipelines on flush and on drop

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::file::{Debouncer, FileTable};
use crate::nav::{Entry, Facade, Runtime};
use crate::report::Reporter;
use crate::storage::{FileStore, MemoryStats};
use crate::tree::{HandlerTable, HookContext, ShardId};
use crate::value::Value;

/// An open tree store
///
/// ## Concurrency Model
///
/// - **Same file**: async writes, reads and removals run in submission order
///   on the file's pipeline
/// - **Different files**: run in parallel on `io_threads` workers
/// - **Façades**: shared by reference; mutations are visible to every
///   holder immediately, persistence follows the debounce policy
pub struct Engine {
    config: Config,
    store: Arc<FileStore>,
    runtime: Arc<Runtime>,
    root: Facade,

    // Declared last so pending timers fire before the store goes away
    debouncer: Debouncer,
}

impl Engine {
    /// Open or create a store with the given config
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let reporter = Reporter::new(config.on_error.clone());
        let store = Arc::new(FileStore::open(&config, reporter)?);
        let debouncer = Debouncer::start()?;
        let files = Arc::new(FileTable::new(Arc::clone(&store), &debouncer, &config));

        let runtime = Runtime::new(
            files,
            config.depth,
            Arc::new(HandlerTable::new()),
            Arc::new(HandlerTable::new()),
        );
        let root = runtime.materialize(ShardId::root())?;

        tracing::info!(folder = %store.base().display(), depth = config.depth, "engine opened");

        Ok(Self {
            config,
            store,
            runtime,
            root,
            debouncer,
        })
    }

    /// Open with default options in `path`
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().folder(path.as_ref()).build())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Façade of the root level
    pub fn root(&self) -> Facade {
        self.root.clone()
    }

    // =========================================================================
    // Root shortcuts
    // =========================================================================

    pub fn get(&self, key: &str) -> Result<Option<Entry>> {
        self.root.get(key)
    }

    pub fn value(&self, key: &str) -> Result<Option<Value>> {
        self.root.value(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.root.set(key, value)
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.root.delete(key)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.root.keys()
    }

    /// Façade at `path` below the root; `None` if any step is missing
    pub fn navigate(&self, path: &[&str]) -> Result<Option<Facade>> {
        self.root.open(path)
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Make a handler available to `define_hooks` / `define_methods`
    pub fn register_handler<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.runtime.handlers.register(name, handler);
    }

    /// Install a method callable on every level
    pub fn share_method<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut HookContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.runtime.shared.register(name, handler);
    }

    pub fn unshare_method(&self, name: &str) -> bool {
        self.runtime.shared.remove(name)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Write every debounced mutation and wait for all queued I/O
    pub fn flush(&self) {
        self.debouncer.drain();
        self.store.flush();
    }

    /// Remove empty shard directories; returns how many were removed
    pub fn prune(&self) -> usize {
        self.store.prune().wait().unwrap_or(0)
    }

    /// Cache occupancy per category
    pub fn memory(&self) -> MemoryStats {
        self.store.stats()
    }

    /// Physical path of a structural file
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        self.store.locate(name)
    }

    /// Number of materialized façades
    pub fn live_facades(&self) -> usize {
        self.runtime.live()
    }

    /// Flush and release the store
    pub fn close(self) {
        self.flush();
        tracing::info!(folder = %self.store.base().display(), "engine closed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("folder", &self.store.base())
            .field("depth", &self.config.depth)
            .finish()
    }
}
