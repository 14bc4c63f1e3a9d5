//! Error types for docmirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use docmirror_core::{ConfigError, GenerateError, VcsError};

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A precondition failed before anything was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: generated content is {size} bytes, limit is {limit}")]
    SizeLimitExceeded { path: PathBuf, size: u64, limit: u64 },

    #[error("structural conflict in {path}")]
    StructuralConflict { path: PathBuf },

    /// Digest computation failed (file unreadable or vanished mid-read).
    #[error("cannot hash {path}: {source}")]
    HashComputation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or reconciling a documentation target failed.
    #[error("cannot resolve {path}: {message}")]
    Resolution { path: PathBuf, message: String },

    #[error("content generation failed: {0}")]
    Generation(#[from] GenerateError),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("run {run_id} was cancelled")]
    Cancelled { run_id: String },

    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// JSON serialization/deserialization error (fingerprint cache).
    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
