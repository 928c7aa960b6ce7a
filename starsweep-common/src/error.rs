//! Common error types for starsweep

use std::path::PathBuf;

use thiserror::Error;

/// Common result type for starsweep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the starsweep binaries
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Candidate store file failed to parse. Fails the process closed:
    /// confirmed detections are never silently discarded.
    #[error("Candidate store corrupt at {path}: {detail}")]
    StoreCorrupt { path: PathBuf, detail: String },

    /// Durable write (tmp + fsync + rename) failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Worker pool is at capacity; caller should retry after draining
    #[error("Worker pool saturated")]
    PoolSaturated,

    /// Worker pool no longer accepts submissions
    #[error("Worker pool shut down")]
    PoolShutDown,

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
