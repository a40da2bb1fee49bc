//! Tree Module
//!
//! Logical structure of the store: how one level of the tree maps onto its
//! index, node and flow files, and how nested values are split into shards.
//!
//! ## Responsibilities
//! - `ShardId` / `ShardCodec`: naming shards, forging and purging subtrees
//! - `IndexMap` / `NodeMap`: the two persisted maps of a level
//! - `HookRegistry`: per-level bindings to named handlers
//! - `TreeLevel`: get/set/delete/keys over all of the above

mod cluster;
mod flow;
mod index;
mod node;
mod shard;

pub use cluster::TreeLevel;
pub use flow::{
    Handler, HandlerTable, HookContext, HookRegistry, Outcome, CALL_GROUP, PROXY_GROUP,
};
pub use index::IndexMap;
pub use node::NodeMap;
pub use shard::{PurgeListener, ShardCodec, ShardId};

pub(crate) use flow::run_handler;
