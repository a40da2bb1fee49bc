//! Cache Module
//!
//! Byte-budgeted in-memory cache sitting in front of the file store.
//!
//! ## Responsibilities
//! - Keep recently used payloads resident up to a fixed byte budget
//! - Evict least-recently-used entries first
//! - Keep pinned entries (root files) resident regardless of budget
//!
//! ## Data Structure Choice
//! A `HashMap` of slots plus a `VecDeque` recency queue with lazy
//! invalidation: every touch appends a fresh stamp, stale stamps are skipped
//! on eviction and the queue is compacted once it grows past twice the live
//! entry count. Lookup, touch and eviction are O(1) amortized.

mod bounded;

pub use bounded::{BoundedCache, CacheStats, Footprint};
