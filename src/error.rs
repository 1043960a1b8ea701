//! Error types for badger
//!
//! One error kind per propagation class: configuration and pre-flight
//! problems abort before any worker starts, descriptor and I/O problems
//! travel the pipeline's error funnel, metadata problems are fatal on
//! store creation and downgraded to descriptor errors on row writes.

use thiserror::Error;

/// Result type for badger operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid arguments, empty or single-match globs
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed or insufficient free-space probe
    #[error("pre-flight check failed: {0}")]
    Preflight(String),

    /// Per-file failure: stat, non-regular source, image decode
    #[error("{0}")]
    Descriptor(String),

    /// Metadata store failure
    #[error("metadata store error: {0}")]
    Metadata(#[from] sqlx::Error),

    /// I/O error on source or destination
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Run-scoped cancellation fired
    #[error("run cancelled")]
    Cancelled,
}
