//! Shared sync pipeline entrypoint used by the CLI.
//!
//! `detect → batch → run-store maintenance → cache save`. The cache save is
//! the only step after the batch whose failure is an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use docmirror_core::{config::STATE_DIR, ContentGenerator, SyncConfig, VersionControl};

use crate::batch::BatchResult;
use crate::detector::ChangeDetector;
use crate::error::SyncError;
use crate::fingerprint::FingerprintCache;
use crate::ignore::GlobIgnore;
use crate::layout::MirrorLayout;
use crate::orchestrator::{RunOptions, WorkflowOrchestrator};
use crate::progress::ProgressSink;
use crate::resolver::ConflictResolver;
use crate::state::RunStore;

/// Archived runs older than this are dropped by maintenance.
const HISTORY_MAX_AGE_DAYS: i64 = 7;

/// Which source files a pipeline run considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every file under the source root.
    All,
    /// Just these files (absolute, or relative to the project root).
    Paths(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub run: RunOptions,
    /// Process every candidate, changed or not.
    pub force: bool,
    /// Compare digests instead of size and mtime.
    pub deep: bool,
    /// Report the candidates and stop.
    pub dry_run: bool,
    pub stale_run_timeout_secs: u64,
}

impl PipelineOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        PipelineOptions {
            run: RunOptions::from_config(config),
            force: false,
            deep: false,
            dry_run: false,
            stale_run_timeout_secs: config.stale_run_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Files selected for processing.
    pub candidates: Vec<PathBuf>,
    /// Tracked files that no longer exist; their cache entries were dropped.
    pub deleted: Vec<PathBuf>,
    pub unchanged: usize,
    pub dry_run: bool,
    /// `None` when nothing needed processing or on a dry run.
    pub batch: Option<BatchResult>,
    pub evicted_runs: usize,
    pub cache_saved: bool,
}

impl PipelineReport {
    pub fn success(&self) -> bool {
        self.batch.as_ref().map_or(true, BatchResult::success)
    }
}

/// Wire the default collaborators for a project rooted at `root`.
///
/// Cache keys are relative to `root`; the docs tree and the state directory
/// are never scanned.
pub fn build_orchestrator(
    root: &Path,
    config: &SyncConfig,
    vcs: Arc<dyn VersionControl>,
    generator: Arc<dyn ContentGenerator>,
) -> Result<WorkflowOrchestrator, SyncError> {
    let cache = FingerprintCache::open(config.cache_path(root)).into_shared();
    let ignore = GlobIgnore::with_defaults(&config.ignore)?;
    let detector = ChangeDetector::new(root, cache, Arc::new(ignore))
        .exclude(config.docs_dir(root))
        .exclude(STATE_DIR);
    Ok(WorkflowOrchestrator::new(
        vcs,
        generator,
        ConflictResolver::from_config(config),
        detector,
        MirrorLayout::from_config(root, config),
        Arc::new(RunStore::new(config.history_limit)),
    ))
}

/// Run the sync pipeline for `scope`.
pub fn run(
    orchestrator: &WorkflowOrchestrator,
    scope: SyncScope,
    options: &PipelineOptions,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Result<PipelineReport, SyncError> {
    let mut report = select(orchestrator, scope, options)?;
    if options.dry_run {
        tracing::info!(candidates = report.candidates.len(), "dry run, nothing processed");
        return Ok(report);
    }

    if !report.candidates.is_empty() {
        report.batch = Some(orchestrator.run_batch(&report.candidates, &options.run, progress)?);
    }

    let store = orchestrator.store();
    report.evicted_runs =
        store.evict_stale(chrono::Duration::seconds(options.stale_run_timeout_secs as i64));
    store.prune_history(chrono::Duration::days(HISTORY_MAX_AGE_DAYS));

    report.cache_saved = orchestrator.detector().cache().write().save(false)?;
    Ok(report)
}

/// Candidates `run` would process, without processing them.
pub fn dry_run(
    orchestrator: &WorkflowOrchestrator,
    scope: SyncScope,
    options: &PipelineOptions,
) -> Result<PipelineReport, SyncError> {
    let options = PipelineOptions {
        dry_run: true,
        ..options.clone()
    };
    run(orchestrator, scope, &options, None)
}

fn select(
    orchestrator: &WorkflowOrchestrator,
    scope: SyncScope,
    options: &PipelineOptions,
) -> Result<PipelineReport, SyncError> {
    let detector = orchestrator.detector();
    let mut report = PipelineReport {
        candidates: Vec::new(),
        deleted: Vec::new(),
        unchanged: 0,
        dry_run: options.dry_run,
        batch: None,
        evicted_runs: 0,
        cache_saved: false,
    };

    match scope {
        SyncScope::All => {
            let changes =
                detector.detect_in_directory(orchestrator.layout().source_root(), options.deep, None)?;
            report.candidates = changes.needing_processing();
            if options.force {
                report.candidates.extend(changes.unchanged);
                report.candidates.sort();
            } else {
                report.unchanged = changes.unchanged.len();
            }
            report.deleted = changes.deleted;
        }
        SyncScope::Paths(paths) => {
            let paths: Vec<PathBuf> = paths
                .into_iter()
                .map(|p| {
                    if p.is_absolute() {
                        p
                    } else {
                        detector.root().join(p)
                    }
                })
                .collect();
            report.candidates = if options.deep && !options.force {
                paths
                    .iter()
                    .filter(|p| detector.has_changed_deep(p))
                    .cloned()
                    .collect()
            } else {
                detector.files_needing_processing(&paths, options.force)
            };
            report.unchanged = paths.len() - report.candidates.len();
        }
    }
    tracing::debug!(
        candidates = report.candidates.len(),
        unchanged = report.unchanged,
        deleted = report.deleted.len(),
        "candidates selected"
    );
    Ok(report)
}
