//! Identity memo shared by every façade

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::file::FileTable;
use crate::tree::{HandlerTable, ShardCodec, ShardId, TreeLevel};

use super::facade::{Facade, FacadeInner};

/// Everything a façade needs to reach the rest of the tree
pub(crate) struct Runtime {
    pub(crate) files: Arc<FileTable>,
    pub(crate) codec: Arc<ShardCodec>,
    pub(crate) handlers: Arc<HandlerTable>,
    pub(crate) shared: Arc<HandlerTable>,
    memo: Mutex<HashMap<ShardId, Weak<FacadeInner>>>,
}

impl Runtime {
    pub(crate) fn new(
        files: Arc<FileTable>,
        depth: usize,
        handlers: Arc<HandlerTable>,
        shared: Arc<HandlerTable>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Runtime>| {
            let evict_from = weak.clone();
            let codec = ShardCodec::new(Arc::clone(&files), depth).with_listener(Arc::new(
                move |id: &ShardId| {
                    if let Some(runtime) = evict_from.upgrade() {
                        runtime.evict(id);
                    }
                },
            ));
            Runtime {
                files,
                codec: Arc::new(codec),
                handlers,
                shared,
                memo: Mutex::new(HashMap::new()),
            }
        })
    }

    /// Façade of shard `id`, reusing the live one if any
    pub(crate) fn materialize(self: &Arc<Self>, id: ShardId) -> Result<Facade> {
        let mut memo = self.memo.lock();
        if let Some(inner) = memo.get(&id).and_then(Weak::upgrade) {
            return Ok(Facade::from_inner(inner));
        }

        let level = TreeLevel::open(
            id.clone(),
            Arc::clone(&self.files),
            Arc::clone(&self.codec),
            Arc::clone(&self.handlers),
        )?;
        let facade = Facade::new(level, Arc::clone(self));
        if memo.len() >= 64 && memo.len().is_power_of_two() {
            memo.retain(|_, weak| weak.strong_count() > 0);
        }
        memo.insert(id, facade.downgrade());
        tracing::trace!(memo = memo.len(), "materialized facade");
        Ok(facade)
    }

    /// Forget the façade of a purged shard; handles still held elsewhere
    /// refuse further access
    pub(crate) fn evict(&self, id: &ShardId) {
        let evicted = self.memo.lock().remove(id);
        if let Some(inner) = evicted.and_then(|weak| weak.upgrade()) {
            inner.mark_purged();
        }
    }

    /// Number of live façades
    pub(crate) fn live(&self) -> usize {
        self.memo
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
