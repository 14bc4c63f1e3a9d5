//! docmirror: keep a version-controlled documentation tree in step with a
//! source tree.
//!
//! # Usage
//!
//! ```text
//! docmirror [--root DIR] sync [PATHS...] [--all] [--force] [--deep] [--dry-run]
//!                            [--strategy S] [--no-backup] [--no-restore-point]
//!                            [--allow-dirty] [--workers N] [--json]
//! docmirror [--root DIR] status [--deep] [--json]
//! docmirror [--root DIR] diff <PATH>...
//! docmirror [--root DIR] cache validate|cleanup|clear
//! ```
//!
//! Logging goes to stderr; `RUST_LOG` overrides the default `warn` level.

mod commands;
mod git;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{cache::CacheCommand, diff::DiffArgs, status::StatusArgs, sync::SyncArgs};
use docmirror_core::ResolutionStrategy;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "docmirror",
    version,
    about = "Mirror a source tree into generated, version-controlled documentation",
    long_about = None,
)]
struct Cli {
    /// Project root holding `.docmirror/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate documentation for changed sources and commit it.
    Sync(SyncArgs),

    /// Show which sources changed since their documentation was generated.
    Status(StatusArgs),

    /// Show what sync would do to each documentation target.
    Diff(DiffArgs),

    /// Inspect and maintain the fingerprint cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared strategy argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse a [`ResolutionStrategy`] from its snake_case name.
#[derive(Debug, Clone, Copy)]
pub struct StrategyArg(pub ResolutionStrategy);

impl FromStr for StrategyArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('-', "_");
        ResolutionStrategy::all()
            .iter()
            .find(|strategy| strategy.to_string() == wanted)
            .map(|strategy| Self(*strategy))
            .ok_or_else(|| {
                let names: Vec<String> = ResolutionStrategy::all()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                format!("unknown strategy '{s}'; expected one of: {}", names.join(", "))
            })
    }
}

impl fmt::Display for StrategyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(s: StrategyArg) -> Self {
        s.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let root = cli.root;
    match cli.command {
        Commands::Sync(args) => args.run(&root),
        Commands::Status(args) => args.run(&root),
        Commands::Diff(args) => args.run(&root),
        Commands::Cache { command } => commands::cache::run(command, &root),
    }
}
