//! # docmirror-sync
//!
//! The synchronization engine: fingerprint-based change detection, structural
//! merging and conflict resolution, and a staged, rollback-capable workflow
//! that commits documentation through a [`docmirror_core::VersionControl`]
//! collaborator.
//!
//! Most callers go through [`pipeline::run`]; [`WorkflowOrchestrator`] exposes
//! single-file and batch runs directly.

pub mod batch;
pub mod detector;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod ignore;
pub mod layout;
pub mod merger;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod state;
pub mod writer;

pub use batch::BatchResult;
pub use detector::{ChangeDetector, ChangeReport};
pub use error::SyncError;
pub use fingerprint::{FingerprintCache, SharedCache};
pub use ignore::GlobIgnore;
pub use layout::MirrorLayout;
pub use merger::{ContentMerger, MergePreview, MergeStrategy};
pub use orchestrator::{ArtifactResult, FileResult, RunOptions, RunResult, WorkflowOrchestrator};
pub use pipeline::{PipelineOptions, PipelineReport, SyncScope};
pub use progress::{CollectingSink, ProgressEvent, ProgressSink};
pub use resolver::{ConflictPrompter, ConflictRecord, ConflictResolver, ResolutionOutcome};
pub use state::{RunId, RunKind, RunStatus, RunStore, StageKind, WorkflowRun};
