//! `docmirror sync`: generate documentation for changed sources and commit it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use docmirror_sync::pipeline::{self, PipelineOptions, PipelineReport, SyncScope};
use docmirror_sync::progress::SinkError;
use docmirror_sync::{FileResult, ProgressEvent, ProgressSink};

use super::Project;
use crate::StrategyArg;

/// Arguments for `docmirror sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source files to sync (default: everything under the source root).
    pub paths: Vec<PathBuf>,

    /// Sync every file under the source root.
    #[arg(long, conflicts_with = "paths")]
    pub all: bool,

    /// Process files even when their fingerprint is unchanged.
    #[arg(long)]
    pub force: bool,

    /// Compare content digests instead of size and mtime.
    #[arg(long)]
    pub deep: bool,

    /// List the files that would be processed and stop.
    #[arg(long)]
    pub dry_run: bool,

    /// Resolve every conflict with this strategy.
    #[arg(long)]
    pub strategy: Option<StrategyArg>,

    /// Do not copy existing documentation aside before overwriting it.
    #[arg(long)]
    pub no_backup: bool,

    /// Do not tag a restore point before changing the docs repository.
    #[arg(long)]
    pub no_restore_point: bool,

    /// Run even when the docs repository has uncommitted changes.
    #[arg(long)]
    pub allow_dirty: bool,

    /// Number of files processed in parallel.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Emit the full report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let project = Project::open(root)?;
        let options = self.pipeline_options(&project);
        let scope = if self.all || self.paths.is_empty() {
            SyncScope::All
        } else {
            SyncScope::Paths(self.paths.iter().map(|p| project.absolute(p)).collect())
        };

        let report = if self.dry_run {
            pipeline::dry_run(&project.orchestrator, scope, &options)
        } else {
            std::fs::create_dir_all(project.config.docs_dir(&project.root))
                .context("failed to create the docs directory")?;
            let progress: Option<Arc<dyn ProgressSink>> = if self.json {
                None
            } else {
                Some(Arc::new(print_progress))
            };
            pipeline::run(&project.orchestrator, scope, &options, progress)
        }
        .context("sync failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize sync report")?
            );
        } else {
            print_report(&project, &report);
        }

        if !report.success() {
            let status = report
                .batch
                .as_ref()
                .map(|b| b.run.status.to_string())
                .unwrap_or_default();
            bail!("sync did not complete (run {status})");
        }
        Ok(())
    }

    fn pipeline_options(&self, project: &Project) -> PipelineOptions {
        let mut options = PipelineOptions::from_config(&project.config);
        options.force = self.force;
        options.deep = self.deep;
        options.dry_run = self.dry_run;
        options.run.strategy = self.strategy.map(Into::into);
        if self.no_backup {
            options.run.create_backups = false;
        }
        if self.no_restore_point {
            options.run.create_restore_point = false;
        }
        if self.allow_dirty {
            options.run.require_clean = false;
        }
        if let Some(workers) = self.workers {
            options.run.workers = workers.max(1);
        }
        options
    }
}

fn print_progress(event: &ProgressEvent) -> Result<(), SinkError> {
    if let ProgressEvent::FileCompleted {
        path,
        index,
        total,
        success,
    } = event
    {
        let mark = if *success { "✓".green() } else { "✗".red() };
        eprintln!("[{}/{total}] {mark} {}", index + 1, path.display());
    }
    Ok(())
}

fn print_report(project: &Project, report: &PipelineReport) {
    if report.dry_run {
        if report.candidates.is_empty() {
            println!("[dry-run] nothing to do");
            return;
        }
        println!("[dry-run] would process {} file(s)", report.candidates.len());
        for path in &report.candidates {
            println!("  ~  {}", project.display(path));
        }
        return;
    }

    for path in &report.deleted {
        println!("  {}  {} (source removed)", "-".yellow(), project.display(path));
    }
    let Some(batch) = &report.batch else {
        println!("✓ nothing to do ({} unchanged)", report.unchanged);
        return;
    };

    let written = batch.written().len();
    println!(
        "{} {} file(s) processed: {} ok, {} failed, {} doc(s) written, {} unchanged",
        if batch.success() { "✓".green() } else { "✗".red() },
        batch.files.len(),
        batch.success_count,
        batch.fail_count,
        written,
        report.unchanged,
    );
    for file in &batch.files {
        print_file(project, file);
    }
    if let Some(commit) = &batch.commit {
        println!("committed {}", commit.bright_black());
    }
    for warning in &batch.warnings {
        println!("{} {warning}", "warning:".yellow());
    }
}

fn print_file(project: &Project, file: &FileResult) {
    if let Some(error) = &file.error {
        println!("  {}  {}: {error}", "✗".red(), project.display(&file.source));
        return;
    }
    for artifact in &file.artifacts {
        let mark = if artifact.outcome.written { "✎" } else { "·" };
        let detail = match artifact.conflict {
            Some(kind) => format!(" ({kind}, {})", artifact.outcome.strategy_used),
            None => String::new(),
        };
        println!("  {mark}  {}{detail}", project.display(&artifact.target));
    }
}
