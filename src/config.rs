//! Configuration for shardtree
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TreeError};

/// Longest shard prefix that still fits inside a generated id
pub const MAX_DEPTH: usize = 32;

/// Callback invoked with every failure the engine reports
#[derive(Clone)]
pub struct ErrorHook(Arc<dyn Fn(&TreeError) + Send + Sync>);

impl ErrorHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TreeError) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, err: &TreeError) {
        (self.0)(err)
    }
}

impl fmt::Debug for ErrorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHook(..)")
    }
}

/// Main configuration for a shardtree instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Base folder for all structural files
    /// Internal structure (split layout):
    ///   {folder}/
    ///     ├── root.map, root.node, root.flow
    ///     ├── maps/    (index files)
    ///     ├── nodes/   (node files)
    ///     └── flows/   (hook files)
    pub folder: PathBuf,

    /// Write through a temp file and rename it into place
    pub atomic: bool,

    /// Folder layout for non-root files
    pub layout: Layout,

    /// Number of id characters used as a shard subdirectory (0 = flat)
    pub depth: usize,

    // -------------------------------------------------------------------------
    // Per-category Configuration
    // -------------------------------------------------------------------------
    pub maps: CategoryConfig,
    pub nodes: CategoryConfig,
    pub flows: CategoryConfig,

    // -------------------------------------------------------------------------
    // I/O Configuration
    // -------------------------------------------------------------------------
    /// Worker threads draining the per-file pipelines
    pub io_threads: usize,

    /// Retry policy for transient I/O errors
    pub retry: RetryPolicy,

    /// Error-reporting callback
    pub on_error: Option<ErrorHook>,
}

/// Where non-root files live below the base folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One subfolder per category: `maps/`, `nodes/`, `flows/`
    Split,

    /// A single `data/` subfolder shared by every category
    Combined,
}

/// Cache budget and write batching for one file category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryConfig {
    /// Cache budget in megabytes
    pub memory_mb: f64,

    /// Mutations buffered before a write is forced
    pub threshold: usize,

    /// Idle milliseconds before a write is forced
    pub debounce_ms: u64,
}

impl CategoryConfig {
    pub fn new(memory_mb: f64, threshold: usize, debounce_ms: u64) -> Self {
        Self {
            memory_mb,
            threshold,
            debounce_ms,
        }
    }

    /// Cache budget in bytes
    pub fn memory_bytes(&self) -> usize {
        (self.memory_mb * 1024.0 * 1024.0) as usize
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Retry policy for transient I/O errors (missing directory, fd exhaustion)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub attempts: u32,

    /// Fixed delay between attempts (milliseconds)
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 20,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("./data"),
            atomic: true,
            layout: Layout::Split,
            depth: 2,
            maps: CategoryConfig::new(5.0, 10, 5000),
            nodes: CategoryConfig::new(44.0, 10, 5000),
            flows: CategoryConfig::new(1.0, 2, 3000),
            io_threads: 4,
            retry: RetryPolicy::default(),
            on_error: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check every option, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.folder.as_os_str().is_empty() {
            return Err(TreeError::Config("folder must not be empty".to_string()));
        }
        if self.depth > MAX_DEPTH {
            return Err(TreeError::Config(format!(
                "depth {} exceeds maximum of {}",
                self.depth, MAX_DEPTH
            )));
        }
        for (name, category) in [("maps", &self.maps), ("nodes", &self.nodes), ("flows", &self.flows)] {
            if category.threshold == 0 {
                return Err(TreeError::Config(format!("{name}: threshold must be at least 1")));
            }
            if !category.memory_mb.is_finite() || category.memory_mb <= 0.0 {
                return Err(TreeError::Config(format!(
                    "{name}: memory budget must be a positive number of megabytes"
                )));
            }
        }
        if self.io_threads == 0 {
            return Err(TreeError::Config("io_threads must be at least 1".to_string()));
        }
        if self.retry.attempts == 0 {
            return Err(TreeError::Config("retry attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the base folder
    pub fn folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.folder = path.into();
        self
    }

    /// Enable or disable temp-file + rename writes
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.config.atomic = atomic;
        self
    }

    /// Set the folder layout
    pub fn layout(mut self, layout: Layout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Set the shard subdirectory depth
    pub fn depth(mut self, depth: usize) -> Self {
        self.config.depth = depth;
        self
    }

    /// Split a total memory budget across maps (10%), nodes (88%) and flows (2%)
    pub fn memory(mut self, total_mb: f64) -> Self {
        self.config.maps.memory_mb = total_mb * 0.10;
        self.config.nodes.memory_mb = total_mb * 0.88;
        self.config.flows.memory_mb = total_mb * 0.02;
        self
    }

    /// Set the write threshold for every category
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.config.maps.threshold = threshold;
        self.config.nodes.threshold = threshold;
        self.config.flows.threshold = threshold;
        self
    }

    /// Set the debounce delay for every category (in milliseconds)
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.maps.debounce_ms = ms;
        self.config.nodes.debounce_ms = ms;
        self.config.flows.debounce_ms = ms;
        self
    }

    /// Configure map files
    pub fn maps(mut self, category: CategoryConfig) -> Self {
        self.config.maps = category;
        self
    }

    /// Configure node files
    pub fn nodes(mut self, category: CategoryConfig) -> Self {
        self.config.nodes = category;
        self
    }

    /// Configure flow files
    pub fn flows(mut self, category: CategoryConfig) -> Self {
        self.config.flows = category;
        self
    }

    /// Set the number of I/O worker threads
    pub fn io_threads(mut self, count: usize) -> Self {
        self.config.io_threads = count;
        self
    }

    /// Set the transient error retry policy
    pub fn retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.config.retry = RetryPolicy { attempts, delay_ms };
        self
    }

    /// Install an error-reporting callback
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&TreeError) + Send + Sync + 'static,
    {
        self.config.on_error = Some(ErrorHook::new(f));
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
