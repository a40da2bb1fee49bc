//! Storage Module
//!
//! Physical persistence of structural files.
//!
//! ## Responsibilities
//! - Resolve logical file names to physical paths by category
//! - Atomic replacement of file contents (temp file + rename)
//! - Strict per-path ordering of asynchronous operations
//! - Retry of transient I/O failures
//! - Read-through caching of decoded payloads
//!
//! ## Layout
//! ```text
//! {folder}/
//! ├── root.map  root.node  root.flow     (pinned, always cached)
//! ├── maps/
//! │   └── 3F/3FA9….map                   (depth = 2)
//! ├── nodes/
//! │   └── 3F/3FA9….node
//! └── flows/
//!     └── 3F/3FA9….flow
//! ```
//!
//! ## File Format
//! ```text
//! ┌──────────┬─────────────┬───────────┬──────────────────────┐
//! │Magic (4) │ Version (2) │ CRC32 (4) │ bincode(Map) body    │
//! └──────────┴─────────────┴───────────┴──────────────────────┘
//! ```

mod codec;
mod io;
mod pipeline;
mod store;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::Footprint;
use crate::value::Map;

pub use codec::{decode, encode, HEADER_SIZE, MAGIC, VERSION};
pub use pipeline::Pending;
pub use store::{FileStore, MemoryStats};

/// Decoded payload shared between the cache and the file that owns it
pub type SharedMap = Arc<RwLock<Map>>;

/// Wrap a map for sharing
pub fn shared(map: Map) -> SharedMap {
    Arc::new(RwLock::new(map))
}

impl Footprint for SharedMap {
    fn footprint(&self) -> usize {
        codec::body_size(&self.read())
    }
}

/// Role of a structural file, derived from its name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Index payload: child key → child map file
    Map,
    /// Node payload: child key → literal or node reference
    Node,
    /// Hook registry payload
    Flow,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Map, Category::Node, Category::Flow];

    /// File name suffix, including the dot
    pub fn suffix(self) -> &'static str {
        match self {
            Category::Map => ".map",
            Category::Node => ".node",
            Category::Flow => ".flow",
        }
    }

    /// Subfolder used by the split layout
    pub fn folder(self) -> &'static str {
        match self {
            Category::Map => "maps",
            Category::Node => "nodes",
            Category::Flow => "flows",
        }
    }

    /// Pinned root file of this category
    pub fn root_file(self) -> &'static str {
        match self {
            Category::Map => "root.map",
            Category::Node => "root.node",
            Category::Flow => "root.flow",
        }
    }

    pub fn of(name: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| name.len() > c.suffix().len() && name.ends_with(c.suffix()))
    }
}
