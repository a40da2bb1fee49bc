//! # shardtree
//!
//! An embedded, file-backed hierarchical object store with:
//! - Nested values sharded across many small checksummed files
//! - A byte-bounded LRU cache with pinned root files
//! - Atomic (temp file + rename) writes, ordered per file
//! - Write batching with count thresholds and idle debounce
//! - Per-level hooks bound to named handlers
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Engine / Facade (nav)                        │
//! │        identity-stable handles, hook dispatch                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  TreeLevel (tree)                            │
//! │   IndexMap + NodeMap + HookRegistry + ShardCodec             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │ DebouncedFile │  (file: batching, idle timers)
//!               └───────┬───────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ FileStore   │─────────▶│BoundedCache │
//!   │ (pipelines) │          │   (LRU)     │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use shardtree::{Engine, Value};
//!
//! let engine = Engine::open_path("./data")?;
//! engine.set("user", Value::Map([("name", "ada")].into_iter().collect()))?;
//! let user = engine.navigate(&["user"])?.expect("forged above");
//! assert_eq!(user.value("name")?, Some(Value::from("ada")));
//! engine.flush();
//! # Ok::<(), shardtree::TreeError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod report;

pub mod value;
pub mod cache;
pub mod storage;
pub mod file;
pub mod tree;
pub mod nav;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TreeError};
pub use config::{CategoryConfig, Config, ConfigBuilder, Layout, RetryPolicy};
pub use engine::Engine;
pub use nav::{BoundMethod, Entry, Facade};
pub use tree::{HookContext, ShardId};
pub use value::{Map, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of shardtree
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
