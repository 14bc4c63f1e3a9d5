//! Error types for docmirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or saving the YAML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes the file path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Errors reported by a version-control collaborator.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The VCS command ran and exited unsuccessfully.
    #[error("`{command}` failed (exit {exit_code:?}): {stderr}")]
    Command {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The VCS could not be invoked at all.
    #[error("I/O error running VCS: {0}")]
    Io(#[from] std::io::Error),

    /// A reference (commit, tag) does not exist.
    #[error("unknown reference '{0}'")]
    UnknownRef(String),

    /// Anything else the collaborator wants to report.
    #[error("{0}")]
    Other(String),
}

/// Errors reported by a content-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("cannot read source {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("generation failed for {path}: {message}")]
    Failed { path: PathBuf, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
