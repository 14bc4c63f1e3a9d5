//! Batch runs: one Validate, one restore point, a bounded worker pool and a
//! single aggregate commit.
//!
//! Workers run on tokio's blocking pool, gated by a [`Semaphore`]. They never
//! touch the batch result or the cache; everything flows back over an
//! unbounded channel to the aggregator, which is the only writer of both.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};

use crate::error::{io_err, SyncError};
use crate::orchestrator::{cleanup, FileResult, RunOptions, TouchedEntries, WorkflowOrchestrator};
use crate::progress::{emit, ProgressEvent, ProgressSink};
use crate::state::{RunHandle, RunKind, RunStatus, StageKind, WorkflowRun};

/// Files listed by name in an aggregate commit message.
const COMMIT_LIST_LIMIT: usize = 10;

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub run: WorkflowRun,
    /// Per-file results in input order. Files never started (cancellation)
    /// are absent.
    pub files: Vec<FileResult>,
    pub success_count: usize,
    pub fail_count: usize,
    pub commit: Option<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn success(&self) -> bool {
        self.run.status == RunStatus::Completed
    }

    /// Targets written for successfully processed files; these are what the
    /// aggregate commit stages. A failed file's partial writes are excluded.
    pub fn written(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|f| f.success)
            .flat_map(|f| f.written().map(|p| p.to_path_buf()))
            .collect()
    }
}

enum WorkerEvent {
    Started { index: usize, path: PathBuf },
    Stage { path: PathBuf, stage: StageKind, message: String },
    Finished { index: usize, result: FileResult },
}

/// Commit message listing the first [`COMMIT_LIST_LIMIT`] files.
pub fn batch_commit_message(prefix: &str, files: &[String]) -> String {
    let mut message = format!("{prefix}: {} file(s)\n", files.len());
    for file in files.iter().take(COMMIT_LIST_LIMIT) {
        message.push_str(&format!("\n- {file}"));
    }
    if files.len() > COMMIT_LIST_LIMIT {
        message.push_str(&format!("\n... and {} more", files.len() - COMMIT_LIST_LIMIT));
    }
    message
}

impl WorkflowOrchestrator {
    /// Blocking form of [`run_batch_async`](Self::run_batch_async); builds its
    /// own runtime, so it must not be called from inside one.
    pub fn run_batch(
        &self,
        paths: &[PathBuf],
        options: &RunOptions,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<BatchResult, SyncError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio-runtime", e))?;
        runtime.block_on(self.run_batch_async(paths.to_vec(), options.clone(), progress))
    }

    /// Process `paths` as one run.
    ///
    /// Validation failures return `Err`. Per-file failures are collected; the
    /// run completes when at least one file succeeded and the commit went
    /// through.
    pub async fn run_batch_async(
        &self,
        paths: Vec<PathBuf>,
        options: RunOptions,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<BatchResult, SyncError> {
        let started = Instant::now();
        let sink = progress.as_deref();
        let handle = self.store.create(RunKind::Batch);
        let id = {
            let mut run = handle.lock();
            run.start();
            run.id
        };

        let stage = handle.lock().begin_stage(StageKind::Validate);
        if let Err(e) = self.validate(&paths, &options) {
            self.abort_validation(&handle, stage, &e);
            return Err(e);
        }
        handle.lock().complete_stage(
            stage,
            Some(serde_json::json!({ "files": paths.len() })),
        );

        let total = paths.len();
        let mut result = BatchResult {
            run: handle.lock().clone(),
            files: Vec::new(),
            success_count: 0,
            fail_count: 0,
            commit: None,
            warnings: Vec::new(),
            duration_ms: 0,
        };
        let mut touched = TouchedEntries::new();
        emit(sink, ProgressEvent::BatchStarted { total });

        let outcome = self
            .batch_stages(&handle, paths, &options, sink, &mut result, &mut touched)
            .await;
        let status = match outcome {
            Ok(()) if result.success_count > 0 => RunStatus::Completed,
            Ok(()) => self.fail_run(
                &handle,
                None,
                &SyncError::Validation("no file was processed successfully".to_string()),
                &touched,
            ),
            Err((stage, e)) => self.fail_run(&handle, stage, &e, &touched),
        };

        result.duration_ms = started.elapsed().as_millis() as u64;
        {
            let mut run = handle.lock();
            run.finish(status);
            if !result.warnings.is_empty() {
                run.set_meta("warnings", result.warnings.clone());
            }
        }
        result.run = handle.lock().clone();
        self.store.archive(&id);

        emit(
            sink,
            ProgressEvent::BatchCompleted {
                total,
                success_count: result.success_count,
                fail_count: result.fail_count,
                duration_ms: result.duration_ms,
            },
        );
        tracing::info!(
            run_id = %id,
            total,
            success = result.success_count,
            failed = result.fail_count,
            status = %status,
            "batch finished"
        );
        Ok(result)
    }

    async fn batch_stages(
        &self,
        handle: &RunHandle,
        paths: Vec<PathBuf>,
        options: &RunOptions,
        sink: Option<&dyn ProgressSink>,
        result: &mut BatchResult,
        touched: &mut TouchedEntries,
    ) -> Result<(), (Option<usize>, SyncError)> {
        self.check_cancel(handle)?;
        if options.create_restore_point {
            self.backup_stage(handle)?;
        }

        self.check_cancel(handle)?;
        let stage = handle.lock().begin_stage(StageKind::Generate);
        let total = paths.len();
        let mut slots: Vec<Option<FileResult>> = vec![None; total];
        let mut rx = self.spawn_workers(handle.clone(), paths, options);

        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Started { index, path } => {
                    emit(sink, ProgressEvent::FileStarted { path, index, total });
                }
                WorkerEvent::Stage { path, stage: kind, message } => {
                    emit(
                        sink,
                        ProgressEvent::StageUpdate {
                            path,
                            stage: kind,
                            message,
                        },
                    );
                }
                WorkerEvent::Finished { index, result: mut file } => {
                    for artifact in &file.artifacts {
                        if let Some(kind) = artifact.conflict {
                            emit(
                                sink,
                                ProgressEvent::ConflictDetected {
                                    path: artifact.target.clone(),
                                    kind,
                                    strategy: artifact.outcome.strategy_used,
                                },
                            );
                        }
                    }
                    if let Some(fp) = file.fingerprint.take() {
                        touched.push(self.apply_fingerprint(fp));
                    }
                    emit(
                        sink,
                        ProgressEvent::FileCompleted {
                            path: file.source.clone(),
                            index,
                            total,
                            success: file.success,
                        },
                    );
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(file);
                    }
                }
            }
        }

        result.files = slots.into_iter().flatten().collect();
        result.success_count = result.files.iter().filter(|f| f.success).count();
        result.fail_count = result.files.len() - result.success_count;
        handle.lock().complete_stage(
            stage,
            Some(serde_json::json!({
                "processed": result.files.len(),
                "succeeded": result.success_count,
                "failed": result.fail_count,
            })),
        );

        self.check_cancel(handle)?;
        let written = result.written();
        let processed: Vec<String> = result
            .files
            .iter()
            .filter(|f| f.success)
            .map(|f| f.relative_path.clone())
            .collect();
        let message = options
            .commit_message
            .clone()
            .unwrap_or_else(|| batch_commit_message(&options.commit_prefix, &processed));
        result.commit = self.commit_stage(handle, &written, &message)?;

        let stage = handle.lock().begin_stage(StageKind::Cleanup);
        let targets: Vec<PathBuf> = result
            .files
            .iter()
            .flat_map(|f| f.artifacts.iter().map(|a| a.target.clone()))
            .collect();
        let any_written: Vec<PathBuf> = result
            .files
            .iter()
            .flat_map(|f| f.written().map(|p| p.to_path_buf()))
            .collect();
        result
            .warnings
            .extend(cleanup(&targets, &any_written, options.backup_retention));
        handle.lock().complete_stage(stage, None);
        Ok(())
    }

    /// Launch one blocking task per file, at most `options.workers` at a time.
    ///
    /// The returned channel closes once every launched worker has reported.
    fn spawn_workers(
        &self,
        handle: RunHandle,
        paths: Vec<PathBuf>,
        options: &RunOptions,
    ) -> mpsc::UnboundedReceiver<WorkerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
        let orchestrator = self.clone();
        let options = options.clone();

        tokio::spawn(async move {
            let mut workers = Vec::with_capacity(paths.len());
            for (index, path) in paths.into_iter().enumerate() {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                if handle.lock().cancel_requested {
                    tracing::info!(remaining = index, "cancellation observed, not starting more files");
                    break;
                }

                let tx = tx.clone();
                let orchestrator = orchestrator.clone();
                let options = options.clone();
                let worker_path = path.clone();
                let join = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let _ = tx.send(WorkerEvent::Started {
                        index,
                        path: worker_path.clone(),
                    });
                    let on_stage = |stage: StageKind, message: String| {
                        let _ = tx.send(WorkerEvent::Stage {
                            path: worker_path.clone(),
                            stage,
                            message,
                        });
                    };
                    let result = orchestrator.process_file(&worker_path, &options, &on_stage);
                    let _ = tx.send(WorkerEvent::Finished { index, result });
                });
                workers.push((index, path, join));
            }

            for (index, path, join) in workers {
                if let Err(e) = join.await {
                    tracing::error!(path = %path.display(), error = %e, "worker crashed");
                    let result = FileResult::failed(&path, String::new(), format!("worker crashed: {e}"));
                    let _ = tx.send(WorkerEvent::Finished { index, result });
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_message_lists_every_file_under_the_limit() {
        let files = vec!["a.rs".to_string(), "b.rs".to_string()];
        assert_eq!(
            batch_commit_message("docs: sync", &files),
            "docs: sync: 2 file(s)\n\n- a.rs\n- b.rs"
        );
    }

    #[test]
    fn commit_message_truncates_after_ten() {
        let files: Vec<String> = (0..13).map(|i| format!("f{i}.rs")).collect();
        let message = batch_commit_message("docs", &files);
        assert!(message.starts_with("docs: 13 file(s)\n"));
        assert!(message.contains("- f9.rs"));
        assert!(!message.contains("- f10.rs"));
        assert!(message.ends_with("... and 3 more"));
    }
}
