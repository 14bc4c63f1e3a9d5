//! Glob-based [`IgnoreMatcher`] used for directory-wide change detection.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use docmirror_core::IgnoreMatcher;

use crate::error::SyncError;

/// Patterns ignored in every project.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git/**",
    ".docmirror/**",
    "target/**",
    "**/node_modules/**",
    "**/__pycache__/**",
];

/// Ignore matcher compiled from glob patterns.
///
/// Paths are matched relative to the walked root. A pattern ending in `/**`
/// also matches the directory itself so the walker can prune it.
#[derive(Debug, Clone)]
pub struct GlobIgnore {
    set: GlobSet,
    patterns: Vec<String>,
}

impl GlobIgnore {
    /// Built-in defaults plus `extra` patterns.
    pub fn with_defaults(extra: &[String]) -> Result<Self, SyncError> {
        let patterns: Vec<String> = DEFAULT_IGNORES
            .iter()
            .map(|p| p.to_string())
            .chain(extra.iter().cloned())
            .collect();
        Self::new(patterns)
    }

    /// Only the given patterns.
    pub fn new(patterns: Vec<String>) -> Result<Self, SyncError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            builder.add(compile(pattern)?);
            if let Some(dir) = pattern.strip_suffix("/**") {
                if !dir.is_empty() {
                    builder.add(compile(dir)?);
                }
            }
        }
        let set = builder
            .build()
            .map_err(|e| SyncError::Validation(format!("invalid ignore patterns: {e}")))?;
        Ok(GlobIgnore { set, patterns })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn compile(pattern: &str) -> Result<Glob, SyncError> {
    Glob::new(pattern)
        .map_err(|e| SyncError::Validation(format!("invalid ignore pattern '{pattern}': {e}")))
}

impl IgnoreMatcher for GlobIgnore {
    fn should_ignore(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }
}
