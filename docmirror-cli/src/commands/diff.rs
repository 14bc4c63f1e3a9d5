//! `docmirror diff <PATH>...`: show what sync would do to each target.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use docmirror_sync::diff::{self, TargetChange};
use docmirror_sync::RunOptions;

use super::Project;
use crate::StrategyArg;

/// Arguments for `docmirror diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Source files to preview.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Preview with this strategy instead of the configured ones.
    #[arg(long)]
    pub strategy: Option<StrategyArg>,
}

impl DiffArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let project = Project::open(root)?;
        let paths: Vec<PathBuf> = self.paths.iter().map(|p| project.absolute(p)).collect();
        let mut options = RunOptions::from_config(&project.config);
        options.strategy = self.strategy.map(Into::into);

        let previews =
            diff::preview(&project.orchestrator, &paths, &options).context("diff failed")?;

        let mut shown = 0;
        for preview in &previews {
            let target = project.display(&preview.target);
            match &preview.change {
                TargetChange::Unchanged => continue,
                TargetChange::Added { content } => {
                    println!("--- /dev/null");
                    println!("+++ {target}");
                    for line in content.lines() {
                        println!("+{line}");
                    }
                }
                TargetChange::Kept { conflict, strategy } => {
                    println!("{} {target} kept ({conflict}, {strategy})", "·".bright_black());
                }
                TargetChange::Modified {
                    conflict,
                    strategy,
                    preview: merge,
                } => {
                    println!("{}", format!("# {target} ({conflict}, {strategy})").bold());
                    if let Some(error) = &merge.error {
                        println!("{} {error}", "merge failed:".red());
                    } else {
                        print!("{}", merge.unified_diff);
                        if !merge.unified_diff.ends_with('\n') {
                            println!();
                        }
                    }
                }
            }
            shown += 1;
        }

        if shown == 0 {
            println!("No differences.");
        }
        Ok(())
    }
}
