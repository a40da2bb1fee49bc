//! File Module
//!
//! Debounced, write-batched handles over single structural files.
//!
//! ## Responsibilities
//! - Hand out one live state per logical file name (`FileTable`)
//! - Buffer mutations in memory and write them after N saves or an idle delay
//! - Fire idle timers from one background thread (`Debouncer`)
//!
//! ## Flow
//! ```text
//!   save() ──count < threshold──▶ arm timer ──idle delay──▶ save(force)
//!     │                                                        │
//!     └──count == threshold or force───────────────────────────┴──▶ FileStore::write
//! ```

mod debounced;
mod debouncer;

pub use debounced::{DebouncedFile, FileTable, FlushPolicy};
pub use debouncer::Debouncer;
