//! Shard identifiers and the forge/purge codec
//!
//! A nested map is stored as a tree of shard files. Every shard has a map
//! file (its structural index) and a node file (its flat data), and may have
//! a flow file once hooks are registered on it.
//!
//! ```text
//!  set("b", {c: 2, d: {e: 3}})
//!
//!  root.node  { b: Link(7A….node) }       root.map  { $file, b: 7A….map }
//!       │                                      │
//!  7A….node   { c: 2, d: Link(C1….node) } 7A….map { $file, d: C1….map }
//!       │                                      │
//!  C1….node   { e: 3 }                    C1….map { $file }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::MAX_DEPTH;
use crate::file::FileTable;
use crate::storage::Category;
use crate::value::{Map, Value, FILE_KEY};

const ROOT: &str = "root";

/// Base name shared by the map, node and flow files of one tree level
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(String);

impl ShardId {
    pub fn root() -> Self {
        ShardId(ROOT.to_string())
    }

    /// Fresh random id; the first `depth` characters become a subdirectory
    pub fn generate(depth: usize) -> Self {
        let token = format!("{:032X}", rand::random::<u128>());
        let depth = depth.min(MAX_DEPTH);
        if depth == 0 {
            ShardId(token)
        } else {
            ShardId(format!("{}/{}", &token[..depth], token))
        }
    }

    /// Id of any structural file name
    pub fn from_file(name: &str) -> Option<Self> {
        let category = Category::of(name)?;
        let base = &name[..name.len() - category.suffix().len()];
        Some(ShardId(base.to_string()))
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file(&self, category: Category) -> String {
        format!("{}{}", self.0, category.suffix())
    }

    pub fn map_file(&self) -> String {
        self.file(Category::Map)
    }

    pub fn node_file(&self) -> String {
        self.file(Category::Node)
    }

    pub fn flow_file(&self) -> String {
        self.file(Category::Flow)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Called with the id of every purged shard
pub type PurgeListener = Arc<dyn Fn(&ShardId) + Send + Sync>;

/// Decomposes nested maps into shard files and deletes shard subtrees
pub struct ShardCodec {
    files: Arc<FileTable>,
    depth: usize,
    listener: Option<PurgeListener>,
}

impl ShardCodec {
    pub fn new(files: Arc<FileTable>, depth: usize) -> Self {
        Self {
            files,
            depth,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: PurgeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn gen_id(&self) -> ShardId {
        ShardId::generate(self.depth)
    }

    /// Write `map` as a new shard subtree, children first.
    ///
    /// Returns `None` if any write failed; files already written for the
    /// subtree are left as orphans.
    pub fn forge(&self, map: &Map) -> Option<ShardId> {
        let id = self.gen_id();

        let mut index = Map::new();
        index.insert(FILE_KEY, id.map_file());
        let mut node = Map::new();

        for (key, value) in map.iter() {
            match value.as_shardable() {
                Some(child) => {
                    let child_id = self.forge(child)?;
                    index.insert(key, child_id.map_file());
                    node.insert(key, Value::Link(child_id.node_file()));
                }
                None => {
                    node.insert(key, value.clone());
                }
            }
        }

        let store = self.files.store();
        if !store.write_map_sync(&id.node_file(), node) {
            return None;
        }
        if !store.write_map_sync(&id.map_file(), index) {
            return None;
        }
        tracing::trace!(shard = %id, "forged");
        Some(id)
    }

    /// Delete the shard subtree rooted at a map file.
    ///
    /// Returns the ids removed, deepest first. Missing files are skipped.
    pub fn purge(&self, map_file: &str) -> Vec<ShardId> {
        if Category::of(map_file) != Some(Category::Map) {
            return Vec::new();
        }
        let mut fragment = self.files.snapshot(map_file).unwrap_or_default();
        fragment.insert(FILE_KEY, map_file);
        self.purge_fragment(&fragment)
    }

    /// Delete every child subtree of an index fragment, then the fragment's
    /// own files when it names one through `$file`
    pub fn purge_fragment(&self, fragment: &Map) -> Vec<ShardId> {
        let mut purged = Vec::new();
        self.purge_into(fragment, &mut purged);
        purged
    }

    fn purge_into(&self, fragment: &Map, purged: &mut Vec<ShardId>) {
        for (key, value) in fragment.iter() {
            if key == FILE_KEY {
                continue;
            }
            let Some(child) = value.as_str() else {
                continue;
            };
            if Category::of(child) != Some(Category::Map) {
                continue;
            }
            if let Some(grandchildren) = self.files.snapshot(child) {
                let mut grandchildren = grandchildren;
                grandchildren.insert(FILE_KEY, child);
                self.purge_into(&grandchildren, purged);
            } else if let Some(id) = ShardId::from_file(child) {
                self.remove_shard(&id, purged);
            }
        }

        let own = fragment
            .get(FILE_KEY)
            .and_then(Value::as_str)
            .and_then(ShardId::from_file);
        if let Some(id) = own {
            self.remove_shard(&id, purged);
        }
    }

    fn remove_shard(&self, id: &ShardId, purged: &mut Vec<ShardId>) {
        if id.is_root() {
            return;
        }
        let store = self.files.store();
        for category in Category::ALL {
            let name = id.file(category);
            self.files.discard(&name);
            let _ = store.remove(&name);
        }
        if let Some(listener) = &self.listener {
            listener(id);
        }
        tracing::trace!(shard = %id, "purged");
        purged.push(id.clone());
    }
}

impl fmt::Debug for ShardCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardCodec")
            .field("depth", &self.depth)
            .finish()
    }
}
