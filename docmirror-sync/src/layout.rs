//! Mapping from source files to their mirrored documentation paths.
//!
//! | Artifact kind | Target                      |
//! |---------------|-----------------------------|
//! | `primary`     | `<docs_root>/S.<ext>`       |
//! | any other `K` | `<docs_root>/S.K.<ext>`     |
//!
//! where `S` is the source path relative to `source_root`.

use std::path::{Path, PathBuf};

use docmirror_core::{SyncConfig, PRIMARY_ARTIFACT};

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    source_root: PathBuf,
    docs_root: PathBuf,
    extension: String,
}

impl MirrorLayout {
    pub fn new(
        source_root: impl Into<PathBuf>,
        docs_root: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        MirrorLayout {
            source_root: source_root.into(),
            docs_root: docs_root.into(),
            extension: extension.into(),
        }
    }

    /// Layout for the project at `root` as configured.
    pub fn from_config(root: &Path, config: &SyncConfig) -> Self {
        Self::new(
            config.source_dir(root),
            config.docs_dir(root),
            config.doc_extension.clone(),
        )
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn docs_root(&self) -> &Path {
        &self.docs_root
    }

    /// `source` relative to the source root, forward-slash separated.
    ///
    /// Fails when `source` lies outside the source root.
    pub fn relative_source(&self, source: &Path) -> Result<String, SyncError> {
        let rel = if source.is_absolute() {
            source.strip_prefix(&self.source_root).map_err(|_| {
                SyncError::Validation(format!(
                    "{} is outside the source root {}",
                    source.display(),
                    self.source_root.display()
                ))
            })?
        } else {
            source
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel.is_empty() || rel.split('/').any(|c| c == "..") {
            return Err(SyncError::Validation(format!(
                "'{}' does not name a file under the source root",
                source.display()
            )));
        }
        Ok(rel)
    }

    /// Documentation target for artifact `kind` of `relative_source`.
    pub fn doc_path(&self, relative_source: &str, kind: &str) -> PathBuf {
        let name = if kind == PRIMARY_ARTIFACT {
            format!("{relative_source}.{}", self.extension)
        } else {
            format!("{relative_source}.{kind}.{}", self.extension)
        };
        self.docs_root.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> MirrorLayout {
        MirrorLayout::new("/p/src", "/p/docs", "md")
    }

    #[test]
    fn primary_and_secondary_targets() {
        let l = layout();
        assert_eq!(l.doc_path("pkg/a.py", "primary"), PathBuf::from("/p/docs/pkg/a.py.md"));
        assert_eq!(
            l.doc_path("pkg/a.py", "history"),
            PathBuf::from("/p/docs/pkg/a.py.history.md")
        );
    }

    #[test]
    fn relative_source_strips_root() {
        let l = layout();
        assert_eq!(l.relative_source(Path::new("/p/src/pkg/a.py")).unwrap(), "pkg/a.py");
        assert_eq!(l.relative_source(Path::new("pkg/a.py")).unwrap(), "pkg/a.py");
    }

    #[test]
    fn outside_root_is_rejected() {
        let l = layout();
        assert!(l.relative_source(Path::new("/elsewhere/a.py")).is_err());
        assert!(l.relative_source(Path::new("../a.py")).is_err());
    }
}
