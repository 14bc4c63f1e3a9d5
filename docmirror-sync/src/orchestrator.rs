//! Staged, rollback-capable processing of source files.
//!
//! A single-file run moves through
//! `Validate → Backup? → Generate → Resolve → Commit → Cleanup`. Once a
//! restore point exists, any later failure (or a cancellation observed at a
//! stage boundary) resets the docs repository to it. The batch form lives in
//! [`crate::batch`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use docmirror_core::{
    ConflictKind, ContentGenerator, FileFingerprint, GeneratedArtifacts, GenerationRequest,
    ResolutionStrategy, SyncConfig, VersionControl,
};

use crate::detector::ChangeDetector;
use crate::error::SyncError;
use crate::layout::MirrorLayout;
use crate::resolver::{ConflictResolver, ResolutionOutcome};
use crate::state::{
    RunHandle, RunId, RunKind, RunStatus, RunStore, RunSummary, StageKind, WorkflowRun,
    META_FAILURE, META_RESTORE_POINT, META_ROLLBACK_ERROR,
};
use crate::writer;

/// Per-run knobs. [`RunOptions::from_config`] mirrors the project settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub create_restore_point: bool,
    pub create_backups: bool,
    /// Strategy forced on every conflict, whatever its kind.
    pub strategy: Option<ResolutionStrategy>,
    /// Per-kind strategies; consulted when `strategy` is unset.
    pub strategy_map: BTreeMap<ConflictKind, ResolutionStrategy>,
    /// Passed through to the content generator.
    pub variables: BTreeMap<String, String>,
    pub require_clean: bool,
    pub workers: usize,
    pub commit_prefix: String,
    /// Replaces the generated commit message.
    pub commit_message: Option<String>,
    pub backup_retention: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions::from_config(&SyncConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        RunOptions {
            create_restore_point: config.restore_points,
            create_backups: config.create_backups,
            strategy: None,
            strategy_map: BTreeMap::new(),
            variables: BTreeMap::new(),
            require_clean: config.require_clean,
            workers: config.workers.max(1),
            commit_prefix: config.commit_prefix.clone(),
            commit_message: None,
            backup_retention: config.backup_retention,
        }
    }

    pub(crate) fn strategy_for(&self, kind: ConflictKind) -> Option<ResolutionStrategy> {
        self.strategy.or_else(|| self.strategy_map.get(&kind).copied())
    }
}

/// What happened to one generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactResult {
    pub kind: String,
    pub target: PathBuf,
    /// `None` when the target did not exist before the run.
    pub conflict: Option<ConflictKind>,
    pub outcome: ResolutionOutcome,
}

/// Generate + resolve result for one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub source: PathBuf,
    pub relative_path: String,
    pub success: bool,
    pub artifacts: Vec<ArtifactResult>,
    pub error: Option<String>,
    /// Fresh fingerprint for the cache; absent on failure or when any
    /// artifact was skipped.
    #[serde(skip)]
    pub fingerprint: Option<FileFingerprint>,
}

impl FileResult {
    pub(crate) fn failed(source: &Path, relative_path: String, error: impl Into<String>) -> Self {
        FileResult {
            source: source.to_path_buf(),
            relative_path,
            success: false,
            artifacts: Vec::new(),
            error: Some(error.into()),
            fingerprint: None,
        }
    }

    /// Targets this file wrote.
    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.artifacts
            .iter()
            .filter(|a| a.outcome.written)
            .map(|a| a.target.as_path())
    }

    pub fn skipped(&self) -> bool {
        self.artifacts
            .iter()
            .any(|a| a.outcome.strategy_used == ResolutionStrategy::Skip)
    }
}

/// Outcome of [`WorkflowOrchestrator::run_single`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub run: WorkflowRun,
    pub file: Option<FileResult>,
    pub commit: Option<String>,
    pub warnings: Vec<String>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.run.status == RunStatus::Completed
    }
}

/// Cache entries replaced during a run, for undoing it.
pub(crate) type TouchedEntries = Vec<(String, Option<FileFingerprint>)>;

/// Sequences detection, generation, resolution and commits for a docs tree.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    pub(crate) vcs: Arc<dyn VersionControl>,
    pub(crate) generator: Arc<dyn ContentGenerator>,
    pub(crate) resolver: Arc<ConflictResolver>,
    pub(crate) detector: ChangeDetector,
    pub(crate) layout: Arc<MirrorLayout>,
    pub(crate) store: Arc<RunStore>,
}

impl WorkflowOrchestrator {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        generator: Arc<dyn ContentGenerator>,
        resolver: ConflictResolver,
        detector: ChangeDetector,
        layout: MirrorLayout,
        store: Arc<RunStore>,
    ) -> Self {
        WorkflowOrchestrator {
            vcs,
            generator,
            resolver: Arc::new(resolver),
            detector,
            layout: Arc::new(layout),
            store,
        }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<RunStore> {
        &self.store
    }

    pub fn status(&self, id: &RunId) -> Option<RunSummary> {
        self.store.status(id)
    }

    pub fn list_active(&self) -> Vec<RunSummary> {
        self.store.list_active()
    }

    /// Request cancellation; only a `Running` run accepts it.
    pub fn cancel(&self, id: &RunId) -> bool {
        self.store.cancel(id)
    }

    /// Process one source file as its own run.
    ///
    /// Validation failures return `Err` without mutating anything; every later
    /// failure is reported through the run status of the returned result.
    pub fn run_single(&self, path: &Path, options: &RunOptions) -> Result<RunResult, SyncError> {
        let handle = self.store.create(RunKind::Single);
        let id = {
            let mut run = handle.lock();
            run.start();
            run.id
        };
        let mut result = RunResult {
            run: handle.lock().clone(),
            file: None,
            commit: None,
            warnings: Vec::new(),
        };

        let stage = handle.lock().begin_stage(StageKind::Validate);
        let relative = match self.validate(&[path.to_path_buf()], options) {
            Ok(mut rel) => rel.remove(0),
            Err(e) => {
                self.abort_validation(&handle, stage, &e);
                return Err(e);
            }
        };
        handle.lock().complete_stage(stage, None);

        let mut touched = TouchedEntries::new();
        let outcome = self.single_stages(&handle, path, &relative, options, &mut result, &mut touched);
        let status = match outcome {
            Ok(()) => RunStatus::Completed,
            Err((stage, e)) => self.fail_run(&handle, stage, &e, &touched),
        };

        {
            let mut run = handle.lock();
            run.finish(status);
            if !result.warnings.is_empty() {
                run.set_meta("warnings", result.warnings.clone());
            }
        }
        result.run = handle.lock().clone();
        self.store.archive(&id);
        tracing::info!(run_id = %id, path = %path.display(), status = %status, "single run finished");
        Ok(result)
    }

    /// Stages after Validate. An error carries the index of the failing stage.
    fn single_stages(
        &self,
        handle: &RunHandle,
        source: &Path,
        relative: &str,
        options: &RunOptions,
        result: &mut RunResult,
        touched: &mut TouchedEntries,
    ) -> Result<(), (Option<usize>, SyncError)> {
        self.check_cancel(handle)?;
        if options.create_restore_point {
            self.backup_stage(handle)?;
        }

        self.check_cancel(handle)?;
        let stage = handle.lock().begin_stage(StageKind::Generate);
        let artifacts = self
            .generate(source, relative, options)
            .map_err(|e| (Some(stage), e))?;
        handle.lock().complete_stage(
            stage,
            Some(serde_json::json!({ "artifacts": artifacts.keys().collect::<Vec<_>>() })),
        );

        self.check_cancel(handle)?;
        let stage = handle.lock().begin_stage(StageKind::Resolve);
        let mut file = self.resolve_artifacts(source, relative.to_string(), artifacts, options);
        if !file.success {
            let error = SyncError::Resolution {
                path: source.to_path_buf(),
                message: file.error.clone().unwrap_or_default(),
            };
            result.file = Some(file);
            return Err((Some(stage), error));
        }
        if let Some(fp) = file.fingerprint.take() {
            touched.push(self.apply_fingerprint(fp));
        }
        handle.lock().complete_stage(
            stage,
            Some(serde_json::json!({ "written": file.written().count() })),
        );
        let written: Vec<PathBuf> = file.written().map(Path::to_path_buf).collect();
        let targets: Vec<PathBuf> = file.artifacts.iter().map(|a| a.target.clone()).collect();
        result.file = Some(file);

        self.check_cancel(handle)?;
        let message = options
            .commit_message
            .clone()
            .unwrap_or_else(|| format!("{}: {relative}", options.commit_prefix));
        result.commit = self.commit_stage(handle, &written, &message)?;

        let stage = handle.lock().begin_stage(StageKind::Cleanup);
        result.warnings.extend(cleanup(&targets, &written, options.backup_retention));
        handle.lock().complete_stage(stage, None);
        Ok(())
    }

    /// Check that the run may start and map every path to its relative form.
    pub(crate) fn validate(
        &self,
        paths: &[PathBuf],
        options: &RunOptions,
    ) -> Result<Vec<String>, SyncError> {
        if paths.is_empty() {
            return Err(SyncError::Validation("no files to process".to_string()));
        }
        let mut relative = Vec::with_capacity(paths.len());
        for path in paths {
            if !path.is_file() {
                return Err(SyncError::Validation(format!(
                    "source file not found: {}",
                    path.display()
                )));
            }
            relative.push(self.layout.relative_source(path)?);
        }
        if options.require_clean && !self.vcs.is_clean()? {
            return Err(SyncError::Validation(
                "docs repository has uncommitted changes".to_string(),
            ));
        }
        Ok(relative)
    }

    pub(crate) fn abort_validation(&self, handle: &RunHandle, stage: usize, error: &SyncError) {
        let id = {
            let mut run = handle.lock();
            run.fail_stage(stage, error.to_string());
            run.set_meta(META_FAILURE, error.to_string());
            run.finish(RunStatus::Failed);
            run.id
        };
        self.store.archive(&id);
        tracing::warn!(run_id = %id, error = %error, "validation failed");
    }

    pub(crate) fn check_cancel(&self, handle: &RunHandle) -> Result<(), (Option<usize>, SyncError)> {
        let run = handle.lock();
        if run.cancel_requested {
            return Err((
                None,
                SyncError::Cancelled {
                    run_id: run.id.to_string(),
                },
            ));
        }
        Ok(())
    }

    /// Tag the current docs state as the run's restore point.
    pub(crate) fn backup_stage(&self, handle: &RunHandle) -> Result<(), (Option<usize>, SyncError)> {
        let (stage, name) = {
            let mut run = handle.lock();
            let name = format!(
                "docmirror-restore-{}-{}",
                run.id.short(),
                Utc::now().format("%Y%m%d%H%M%S")
            );
            (run.begin_stage(StageKind::Backup), name)
        };
        match self.vcs.tag(&name, Some("docmirror restore point"), None) {
            Ok(tag) => {
                let mut run = handle.lock();
                run.set_meta(META_RESTORE_POINT, tag.clone());
                run.complete_stage(stage, Some(serde_json::json!({ "restore_point": tag })));
                Ok(())
            }
            Err(e) => Err((Some(stage), e.into())),
        }
    }

    /// Stage and commit `written`. Nothing written means no commit.
    pub(crate) fn commit_stage(
        &self,
        handle: &RunHandle,
        written: &[PathBuf],
        message: &str,
    ) -> Result<Option<String>, (Option<usize>, SyncError)> {
        let stage = handle.lock().begin_stage(StageKind::Commit);
        if written.is_empty() {
            handle
                .lock()
                .complete_stage(stage, Some(serde_json::json!({ "skipped": "nothing written" })));
            return Ok(None);
        }
        let committed = self
            .vcs
            .add(written)
            .and_then(|()| self.vcs.commit(message))
            .map_err(|e| (Some(stage), SyncError::Commit(e.to_string())))?;
        handle
            .lock()
            .complete_stage(stage, Some(serde_json::json!({ "commit": committed })));
        Ok(Some(committed))
    }

    /// Record the failure, roll back when possible and pick the terminal status.
    pub(crate) fn fail_run(
        &self,
        handle: &RunHandle,
        stage: Option<usize>,
        error: &SyncError,
        touched: &TouchedEntries,
    ) -> RunStatus {
        let cancelled = matches!(error, SyncError::Cancelled { .. });
        let restore_point = {
            let mut run = handle.lock();
            if let Some(stage) = stage {
                run.fail_stage(stage, error.to_string());
            }
            run.set_meta(META_FAILURE, error.to_string());
            run.restore_point().map(str::to_string)
        };
        self.restore_cache(touched);

        let Some(tag) = restore_point else {
            tracing::warn!(error = %error, "run failed without a restore point");
            return if cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed
            };
        };

        let stage = handle.lock().begin_stage(StageKind::Rollback);
        match self.rollback(&tag) {
            Ok(()) => {
                handle
                    .lock()
                    .complete_stage(stage, Some(serde_json::json!({ "reset_to": tag })));
                tracing::warn!(error = %error, restore_point = %tag, "run rolled back");
                if cancelled {
                    RunStatus::Cancelled
                } else {
                    RunStatus::RolledBack
                }
            }
            Err(e) => {
                let mut run = handle.lock();
                run.fail_stage(stage, e.to_string());
                run.set_meta(META_ROLLBACK_ERROR, e.to_string());
                tracing::error!(error = %error, rollback_error = %e, "rollback failed");
                if cancelled {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Failed
                }
            }
        }
    }

    fn rollback(&self, tag: &str) -> Result<(), SyncError> {
        match self.vcs.object_exists(tag) {
            Ok(true) => {}
            Ok(false) => return Err(SyncError::Rollback(format!("restore point {tag} not found"))),
            Err(e) => return Err(SyncError::Rollback(e.to_string())),
        }
        self.vcs
            .reset(tag, true)
            .map_err(|e| SyncError::Rollback(e.to_string()))
    }

    fn restore_cache(&self, touched: &TouchedEntries) {
        if touched.is_empty() {
            return;
        }
        let mut cache = self.detector.cache().write();
        for (key, previous) in touched.iter().rev() {
            cache.restore_entry(key, previous.clone());
        }
    }

    /// Store `fp`, returning what it replaced.
    pub(crate) fn apply_fingerprint(&self, fp: FileFingerprint) -> (String, Option<FileFingerprint>) {
        let key = fp.path.clone();
        let mut cache = self.detector.cache().write();
        let previous = cache.get(&key).cloned();
        cache.set(&key, fp);
        (key, previous)
    }

    pub(crate) fn generate(
        &self,
        source: &Path,
        relative: &str,
        options: &RunOptions,
    ) -> Result<GeneratedArtifacts, SyncError> {
        let request = GenerationRequest {
            source_path: source.to_path_buf(),
            relative_path: relative.to_string(),
            variables: options.variables.clone(),
        };
        let artifacts = self.generator.generate(&request)?;
        tracing::debug!(source = %relative, artifacts = artifacts.len(), "generated");
        Ok(artifacts)
    }

    /// Write or reconcile every artifact of one source file.
    pub(crate) fn resolve_artifacts(
        &self,
        source: &Path,
        relative: String,
        artifacts: GeneratedArtifacts,
        options: &RunOptions,
    ) -> FileResult {
        let mut results = Vec::with_capacity(artifacts.len());
        for (kind, content) in artifacts {
            let target = self.layout.doc_path(&relative, &kind);
            let (conflict, outcome) = match self.resolver.detect(&target, &content) {
                None => (None, self.resolver.write_new(&target, &content)),
                Some(record) => {
                    let kind = record.kind;
                    let strategy = options.strategy_for(kind);
                    (
                        Some(kind),
                        self.resolver.resolve(record, strategy, options.create_backups),
                    )
                }
            };
            results.push(ArtifactResult {
                kind,
                target,
                conflict,
                outcome,
            });
        }

        let errors: Vec<String> = results
            .iter()
            .flat_map(|a| a.outcome.errors.iter().cloned())
            .collect();
        let mut file = FileResult {
            source: source.to_path_buf(),
            relative_path: relative,
            success: errors.is_empty(),
            artifacts: results,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            fingerprint: None,
        };
        if file.success && !file.skipped() {
            match self.detector.fingerprint_of(source) {
                Ok(fp) => file.fingerprint = Some(fp),
                Err(e) => tracing::warn!(source = %source.display(), error = %e, "cannot fingerprint after sync"),
            }
        }
        file
    }

    /// Generate and resolve one file, reporting stage changes through `on_stage`.
    pub(crate) fn process_file(
        &self,
        source: &Path,
        options: &RunOptions,
        on_stage: &dyn Fn(StageKind, String),
    ) -> FileResult {
        let relative = match self.layout.relative_source(source) {
            Ok(rel) => rel,
            Err(e) => return FileResult::failed(source, String::new(), e.to_string()),
        };
        on_stage(StageKind::Generate, format!("generating {relative}"));
        let artifacts = match self.generate(source, &relative, options) {
            Ok(artifacts) => artifacts,
            Err(e) => return FileResult::failed(source, relative, e.to_string()),
        };
        on_stage(
            StageKind::Resolve,
            format!("resolving {} artifact(s)", artifacts.len()),
        );
        self.resolve_artifacts(source, relative, artifacts, options)
    }
}

/// Remove stray temp files and prune old backups. Problems become warnings.
pub(crate) fn cleanup(targets: &[PathBuf], written: &[PathBuf], retention: usize) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Err(e) = writer::remove_stray_tmp(targets) {
        warnings.push(format!("cleanup: {e}"));
    }
    for path in written {
        if let Err(e) = writer::prune_backups(path, retention) {
            warnings.push(format!("cleanup: {e}"));
        }
    }
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_strategy_wins_over_map() {
        let mut options = RunOptions::default();
        options
            .strategy_map
            .insert(ConflictKind::ContentModified, ResolutionStrategy::KeepOurs);
        assert_eq!(
            options.strategy_for(ConflictKind::ContentModified),
            Some(ResolutionStrategy::KeepOurs)
        );
        assert_eq!(options.strategy_for(ConflictKind::FileExists), None);

        options.strategy = Some(ResolutionStrategy::Skip);
        assert_eq!(
            options.strategy_for(ConflictKind::ContentModified),
            Some(ResolutionStrategy::Skip)
        );
    }

    #[test]
    fn options_follow_config() {
        let config = SyncConfig {
            workers: 0,
            restore_points: false,
            commit_prefix: "chore(docs)".to_string(),
            ..SyncConfig::default()
        };
        let options = RunOptions::from_config(&config);
        assert_eq!(options.workers, 1);
        assert!(!options.create_restore_point);
        assert_eq!(options.commit_prefix, "chore(docs)");
    }

    #[test]
    fn cleanup_prunes_and_removes_tmp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("a.md");
        std::fs::write(&target, "x").unwrap();
        std::fs::write(tmp.path().join("a.md.docmirror.tmp"), "partial").unwrap();
        for stamp in ["20260101_000000_000001", "20260102_000000_000001"] {
            std::fs::write(tmp.path().join(format!("a.backup_{stamp}.md")), stamp).unwrap();
        }

        let warnings = cleanup(&[target.clone()], &[target.clone()], 1);
        assert!(warnings.is_empty());
        assert!(!tmp.path().join("a.md.docmirror.tmp").exists());
        assert_eq!(writer::list_backups(&target).unwrap().len(), 1);
    }
}
