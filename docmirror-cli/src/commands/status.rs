//! `docmirror status`: which sources changed since their docs were generated.
//!
//! Read-only: the scan runs against the in-memory cache and nothing is saved.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use docmirror_sync::ChangeReport;

use super::Project;

/// Arguments for `docmirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Compare content digests instead of size and mtime.
    #[arg(long)]
    pub deep: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    summary: StatusSummary,
    files: Vec<FileStatus>,
}

#[derive(Debug, Serialize)]
struct StatusSummary {
    tracked: usize,
    new: usize,
    changed: usize,
    unchanged: usize,
    deleted: usize,
}

#[derive(Debug, Serialize, Tabled)]
struct FileStatus {
    #[tabled(rename = "File")]
    path: String,
    #[tabled(rename = "Status")]
    status: &'static str,
}

impl StatusArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let project = Project::open(root)?;
        let detector = project.orchestrator.detector();
        let tracked = detector.cache().read().len();
        let changes = detector
            .detect_in_directory(project.orchestrator.layout().source_root(), self.deep, None)
            .context("failed to scan the source tree")?;

        let report = build_report(&project, tracked, &changes);
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(report);
        Ok(())
    }
}

fn build_report(project: &Project, tracked: usize, changes: &ChangeReport) -> StatusReport {
    let mut files = Vec::new();
    for (paths, status) in [
        (&changes.new, "new"),
        (&changes.changed, "changed"),
        (&changes.deleted, "deleted"),
    ] {
        files.extend(paths.iter().map(|p| FileStatus {
            path: project.display(p),
            status,
        }));
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    StatusReport {
        summary: StatusSummary {
            tracked,
            new: changes.new.len(),
            changed: changes.changed.len(),
            unchanged: changes.unchanged.len(),
            deleted: changes.deleted.len(),
        },
        files,
    }
}

fn print_table(report: StatusReport) {
    let s = &report.summary;
    println!(
        "docmirror v{} | {} tracked | {} new | {} changed | {} deleted",
        env!("CARGO_PKG_VERSION"),
        s.tracked,
        s.new,
        s.changed,
        s.deleted,
    );
    if report.files.is_empty() {
        println!("{} documentation is up to date", "✓".green());
        return;
    }

    let mut table = Table::new(report.files);
    table.with(Style::rounded());
    println!("{table}");
    println!("Run 'docmirror sync' to update the documentation.");
}
