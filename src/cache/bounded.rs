//! Bounded cache implementation
//!
//! LRU eviction by byte size with a pinned subset exempt from eviction.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::TreeError;
use crate::report::Reporter;

/// Approximate resident size of a cached value, in bytes
pub trait Footprint {
    fn footprint(&self) -> usize;
}

impl Footprint for Vec<u8> {
    fn footprint(&self) -> usize {
        self.len()
    }
}

impl Footprint for String {
    fn footprint(&self) -> usize {
        self.len()
    }
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Bytes held by evictable entries
    pub used: usize,
    /// Byte budget
    pub limit: usize,
    /// Number of evictable entries
    pub count: usize,
    /// Number of pinned entries
    pub pinned: usize,
}

struct Slot<V> {
    value: V,
    size: usize,
    stamp: u64,
}

/// Fixed-budget key → value cache with LRU eviction
pub struct BoundedCache<V> {
    /// Byte budget for evictable entries
    limit: usize,
    /// Bytes currently held by evictable entries
    used: usize,
    /// Keys that always bypass eviction
    pinned_keys: HashSet<String>,
    pinned: HashMap<String, V>,
    entries: HashMap<String, Slot<V>>,
    /// Recency queue, oldest first; entries whose stamp no longer matches
    /// their slot are stale
    order: VecDeque<(String, u64)>,
    next_stamp: u64,
    reporter: Reporter,
}

impl<V: Clone + Footprint> BoundedCache<V> {
    /// Create a cache with a byte budget and a set of pinned keys
    pub fn new<I, S>(limit: usize, pinned_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            limit,
            used: 0,
            pinned_keys: pinned_keys.into_iter().map(Into::into).collect(),
            pinned: HashMap::new(),
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_stamp: 0,
            reporter: Reporter::default(),
        }
    }

    /// Route size-limit warnings through the given reporter
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Insert a value, measuring it with its `Footprint`
    pub fn set(&mut self, key: &str, value: V) -> bool {
        if self.pinned_keys.contains(key) {
            self.pinned.insert(key.to_string(), value);
            return true;
        }
        let size = value.footprint();
        self.set_sized(key, value, size)
    }

    /// Insert a value whose size the caller already knows
    pub fn set_sized(&mut self, key: &str, value: V, size: usize) -> bool {
        if self.pinned_keys.contains(key) {
            self.pinned.insert(key.to_string(), value);
            return true;
        }

        if size > self.limit {
            self.reporter.warn(&TreeError::CacheOverflow {
                key: key.to_string(),
                size,
                limit: self.limit,
            });
            return false;
        }

        self.delete(key);

        while self.used + size > self.limit {
            if !self.evict_oldest() {
                break;
            }
        }

        let stamp = self.bump();
        self.entries.insert(key.to_string(), Slot { value, size, stamp });
        self.order.push_back((key.to_string(), stamp));
        self.used += size;
        self.compact();
        true
    }

    /// Look up a value, refreshing its recency
    pub fn get(&mut self, key: &str) -> Option<V> {
        if let Some(value) = self.pinned.get(key) {
            return Some(value.clone());
        }

        let stamp = self.bump();
        let slot = self.entries.get_mut(key)?;
        slot.stamp = stamp;
        let value = slot.value.clone();
        self.order.push_back((key.to_string(), stamp));
        self.compact();
        Some(value)
    }

    /// Look up a value without touching recency
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.pinned
            .get(key)
            .or_else(|| self.entries.get(key).map(|slot| &slot.value))
    }

    pub fn delete(&mut self, key: &str) -> bool {
        if self.pinned_keys.contains(key) {
            return self.pinned.remove(key).is_some();
        }
        match self.entries.remove(key) {
            Some(slot) => {
                self.used -= slot.size;
                true
            }
            None => false,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.pinned.contains_key(key) || self.entries.contains_key(key)
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned_keys.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            used: self.used,
            limit: self.limit,
            count: self.entries.len(),
            pinned: self.pinned.len(),
        }
    }

    /// Drop every evictable entry; pinned entries stay
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.used = 0;
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn bump(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Evict the least recently used live entry; false when nothing is left
    fn evict_oldest(&mut self) -> bool {
        while let Some((key, stamp)) = self.order.pop_front() {
            let live = self
                .entries
                .get(&key)
                .is_some_and(|slot| slot.stamp == stamp);
            if live {
                if let Some(slot) = self.entries.remove(&key) {
                    self.used -= slot.size;
                    tracing::trace!(key = %key, size = slot.size, "evicted cache entry");
                }
                return true;
            }
        }
        false
    }

    /// Drop stale stamps once they dominate the queue
    fn compact(&mut self) {
        if self.order.len() <= 2 * self.entries.len() + 16 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(key, stamp)| entries.get(key).is_some_and(|slot| slot.stamp == *stamp));
    }
}
