use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Embedded or user templates failed to parse.
    #[error("templates failed to compile: {0}")]
    Compile(#[from] tera::Error),

    #[error("cannot build template context: {source}")]
    Context {
        #[source]
        source: tera::Error,
    },

    #[error("no template produces artifact kind `{0}`")]
    UnknownKind(String),

    #[error("failed to render `{kind}`: {source}")]
    Render {
        kind: String,
        #[source]
        source: tera::Error,
    },

    #[error("cannot read template {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}
