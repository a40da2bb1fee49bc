//! Tree level
//!
//! Composes the index, node and hook files of one shard into map semantics
//! with automatic sharding of nested values.
//!
//! ## Invariants
//! - every index entry names a readable map file of a forged shard
//! - a key with an index entry holds a `Link` to the same shard's node file
//! - overwriting or deleting a key with an index entry purges its subtree
//! - a level marked purged never touches its files again

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TreeError};
use crate::file::FileTable;
use crate::value::{Value, FILE_KEY};

use super::flow::{HandlerTable, HookRegistry};
use super::index::IndexMap;
use super::node::NodeMap;
use super::shard::{ShardCodec, ShardId};

/// One level of the tree
#[derive(Debug)]
pub struct TreeLevel {
    id: ShardId,
    index: IndexMap,
    node: NodeMap,
    flow: HookRegistry,
    codec: Arc<ShardCodec>,
    files: Arc<FileTable>,
    purged: AtomicBool,
}

impl TreeLevel {
    /// Bind the files of shard `id`; nothing is read until first access
    pub fn open(
        id: ShardId,
        files: Arc<FileTable>,
        codec: Arc<ShardCodec>,
        handlers: Arc<HandlerTable>,
    ) -> Result<Self> {
        let index = IndexMap::new(files.open(&id.map_file())?);
        let node = NodeMap::new(files.open(&id.node_file())?);
        let flow = HookRegistry::new(Arc::clone(&files), id.flow_file(), handlers);
        Ok(Self {
            id,
            index,
            node,
            flow,
            codec,
            files,
            purged: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &ShardId {
        &self.id
    }

    pub fn index(&self) -> &IndexMap {
        &self.index
    }

    pub fn node(&self) -> &NodeMap {
        &self.node
    }

    pub fn flow(&self) -> &HookRegistry {
        &self.flow
    }

    pub fn codec(&self) -> &ShardCodec {
        &self.codec
    }

    /// Mark this level's shard as deleted from the tree
    pub fn mark_purged(&self) {
        self.purged.store(true, Ordering::Release);
    }

    pub fn is_purged(&self) -> bool {
        self.purged.load(Ordering::Acquire)
    }

    /// Fails with `NotFound` once the shard was purged; touching its files
    /// would recreate them as orphans
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_purged() {
            return Err(TreeError::NotFound(format!("shard {} was deleted", self.id)));
        }
        Ok(())
    }

    /// Stored value of `key`; nested maps come back as `Value::Link`.
    ///
    /// Restores a missing index entry for a linked shard whose map file
    /// still exists.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.ensure_live()?;
        let value = self.node.get(key)?;
        if let Some(Value::Link(node_file)) = &value {
            if let Some(child) = ShardId::from_file(node_file) {
                let map_file = child.map_file();
                let indexed = self.index.get(key)?;
                if indexed.as_deref() != Some(map_file.as_str())
                    && self.files.store().exists_sync(&map_file)
                {
                    tracing::debug!(shard = %self.id, key, "restoring index entry");
                    self.index.set(key, &map_file)?;
                }
            }
        }
        Ok(value)
    }

    /// Store `value` under `key`, replacing any previous subtree.
    ///
    /// Returns `Ok(false)` when a nested map could not be forged; the key is
    /// then left absent.
    pub fn set(&self, key: &str, value: Value) -> Result<bool> {
        if key == FILE_KEY {
            return Err(TreeError::ReservedKey(key.to_string()));
        }
        value.check_writable()?;
        self.ensure_live()?;

        if let Some(previous) = self.index.get(key)? {
            self.codec.purge(&previous);
            self.index.delete(key)?;
        }

        match value.into_shardable() {
            Ok(map) => match self.codec.forge(&map) {
                Some(child) => {
                    self.index.set(key, &child.map_file())?;
                    self.node.set(key, Value::Link(child.node_file()))?;
                    Ok(true)
                }
                None => {
                    tracing::warn!(shard = %self.id, key, "forge failed");
                    self.node.delete(key)?;
                    Ok(false)
                }
            },
            Err(literal) => {
                self.node.set(key, literal)?;
                Ok(true)
            }
        }
    }

    /// Remove `key` and purge its subtree; returns whether it was present
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_live()?;
        if let Some(map_file) = self.index.get(key)? {
            self.codec.purge(&map_file);
            self.index.delete(key)?;
        }
        self.node.delete(key)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.ensure_live()?;
        self.node.keys()
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.ensure_live()?;
        self.node.has(key)
    }

    /// Force pending writes of the index and node files
    pub fn save(&self) -> Result<()> {
        self.ensure_live()?;
        if self.index.file().is_dirty() {
            let _ = self.index.file().save(true)?;
        }
        if self.node.file().is_dirty() {
            let _ = self.node.file().save(true)?;
        }
        Ok(())
    }
}
