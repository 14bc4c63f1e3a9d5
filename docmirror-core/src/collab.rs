//! Collaborator boundaries consumed by the sync engine.
//!
//! The engine never talks to git, a generator, or an ignore file directly; it
//! goes through these object-safe traits so callers can plug in real backends
//! or test doubles (`&dyn VersionControl`, `Arc<dyn ContentGenerator>`, …).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GenerateError, VcsError};

/// Artifact kind written next to the mirrored path (`<file>.md`).
pub const PRIMARY_ARTIFACT: &str = "primary";

/// Artifact kind holding the regeneration log (`<file>.history.md`).
pub const HISTORY_ARTIFACT: &str = "history";

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// The version-control operations the engine relies on.
///
/// Implementations must be safe to share across worker threads; the engine
/// itself only calls mutating methods from one thread per run.
pub trait VersionControl: Send + Sync {
    /// Stage `paths` (relative to the repository root or absolute).
    fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError>;

    /// Commit staged changes and return the new commit id.
    fn commit(&self, message: &str) -> Result<String, VcsError>;

    /// Create a tag named `name` at `target` (default: current head) and return its id.
    fn tag(&self, name: &str, message: Option<&str>, target: Option<&str>)
        -> Result<String, VcsError>;

    /// Move the current branch to `target`; `hard` also resets the working tree.
    fn reset(&self, target: &str, hard: bool) -> Result<(), VcsError>;

    /// True when the working tree has no uncommitted changes.
    fn is_clean(&self) -> Result<bool, VcsError>;

    /// True when `reference` names an existing commit or tag.
    fn object_exists(&self, reference: &str) -> Result<bool, VcsError>;
}

// ---------------------------------------------------------------------------
// Content generation
// ---------------------------------------------------------------------------

/// Input handed to a [`ContentGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Absolute path of the source file.
    pub source_path: PathBuf,
    /// Forward-slash path relative to the source root.
    pub relative_path: String,
    /// Free-form variables supplied by the caller.
    pub variables: BTreeMap<String, String>,
}

/// Generated text keyed by artifact kind (e.g. [`PRIMARY_ARTIFACT`]).
pub type GeneratedArtifacts = BTreeMap<String, String>;

/// Produces documentation text for a source file. Treated as a black box.
pub trait ContentGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedArtifacts, GenerateError>;
}

// ---------------------------------------------------------------------------
// Ignore patterns
// ---------------------------------------------------------------------------

/// Decides which paths directory-wide change detection skips.
pub trait IgnoreMatcher: Send + Sync {
    /// `path` is relative to the walked root, forward-slash separated semantics.
    fn should_ignore(&self, path: &Path) -> bool;
}

/// Matcher that ignores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreNothing;

impl IgnoreMatcher for IgnoreNothing {
    fn should_ignore(&self, _path: &Path) -> bool {
        false
    }
}
