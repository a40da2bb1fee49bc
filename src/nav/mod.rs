//! Navigation Module
//!
//! Exposes the sharded tree as one object graph of façades.
//!
//! ## Dispatch
//! ```text
//!  facade.get(key)
//!     ├─ 1. flow "call" group   → Entry::Method
//!     ├─ 2. shared methods      → Entry::Method
//!     ├─ 3. flow "proxy".get    → resolve / reject / halt
//!     └─ 4. TreeLevel::get      → Entry::Value, or Entry::Node for a Link
//! ```
//!
//! Façades are memoized per shard id in a weak table: a level stays
//! materialized while any handle to it is alive, and purged shards are
//! evicted eagerly.

mod facade;
mod runtime;

pub use facade::{BoundMethod, Entry, Facade};

pub(crate) use runtime::Runtime;
