//! `docmirror cache`: inspect and maintain the fingerprint cache.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;

use super::Project;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Check every entry for malformed digests and timestamps.
    Validate,

    /// Drop entries for vanished sources or not processed recently.
    Cleanup {
        /// Maximum entry age in days (default: `cache_max_age_days`).
        #[arg(long)]
        max_age_days: Option<u64>,
    },

    /// Remove every entry, forcing a full re-sync.
    Clear,
}

pub fn run(command: CacheCommand, root: &Path) -> Result<()> {
    let project = Project::open(root)?;
    let cache = project.orchestrator.detector().cache();

    match command {
        CacheCommand::Validate => {
            let issues = cache.read().validate_integrity();
            if issues.is_empty() {
                println!("{} {} entries, no problems", "✓".green(), cache.read().len());
                return Ok(());
            }
            for issue in &issues {
                println!("  {}  {}: {}", "✗".red(), issue.key, issue.problem);
            }
            bail!("{} cache problem(s) found", issues.len());
        }
        CacheCommand::Cleanup { max_age_days } => {
            let days = max_age_days.unwrap_or(project.config.cache_max_age_days);
            let mut cache = cache.write();
            let existing: HashSet<String> = cache
                .keys()
                .filter(|key| project.root.join(key.as_str()).is_file())
                .cloned()
                .collect();
            let removed = cache.cleanup_stale(&existing, chrono::Duration::days(days as i64));
            cache.save(false).context("failed to save the cache")?;
            println!("removed {removed} stale entr{}", if removed == 1 { "y" } else { "ies" });
        }
        CacheCommand::Clear => {
            let mut cache = cache.write();
            let count = cache.len();
            cache.clear();
            cache.save(true).context("failed to save the cache")?;
            println!("cleared {count} entr{}", if count == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}
