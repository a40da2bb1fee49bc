//! Error types for shardtree
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TreeError
pub type Result<T> = std::result::Result<T, TreeError>;

/// Unified error type for shardtree operations
#[derive(Debug, Error)]
pub enum TreeError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write failed for {file}: {reason}")]
    WriteFailed { file: String, reason: String },

    #[error("File could not be loaded: {0}")]
    Unreadable(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Corrupt file {file}: {reason}")]
    Corrupt { file: String, reason: String },

    #[error("Object '{key}' exceeds cache limit ({size} > {limit} bytes)")]
    CacheOverflow {
        key: String,
        size: usize,
        limit: usize,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Tree Errors
    // -------------------------------------------------------------------------
    #[error("Key is reserved: {0}")]
    ReservedKey(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A hook handler vetoed the operation
    #[error("Rejected: {0}")]
    Rejected(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for TreeError {
    fn from(err: bincode::Error) -> Self {
        TreeError::Serialization(err.to_string())
    }
}
