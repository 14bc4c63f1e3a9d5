//! Core library for docmirror: domain types, configuration and collaborator traits.
//!
//! Public API surface:
//! - [`types`]: fingerprints, conflict kinds, resolution strategies
//! - [`config`]: `.docmirror/config.yaml` load / save
//! - [`collab`]: version-control, generator and ignore boundaries
//! - [`error`]: [`ConfigError`], [`VcsError`], [`GenerateError`]

pub mod collab;
pub mod config;
pub mod error;
pub mod types;

pub use collab::{
    ContentGenerator, GeneratedArtifacts, GenerationRequest, IgnoreMatcher, IgnoreNothing,
    VersionControl, HISTORY_ARTIFACT, PRIMARY_ARTIFACT,
};
pub use config::SyncConfig;
pub use error::{ConfigError, GenerateError, VcsError};
pub use types::{ConflictKind, FileFingerprint, ResolutionStrategy, Severity};
