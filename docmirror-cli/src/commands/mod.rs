//! Subcommand implementations and the project wiring they share.

pub mod cache;
pub mod diff;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use docmirror_core::{config, SyncConfig};
use docmirror_render::TemplateGenerator;
use docmirror_sync::{pipeline, WorkflowOrchestrator};

use crate::git::GitCli;

/// A loaded project: canonical root, configuration and wired orchestrator.
pub struct Project {
    pub root: PathBuf,
    pub config: SyncConfig,
    pub orchestrator: WorkflowOrchestrator,
}

impl Project {
    pub fn open(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("project root {} does not exist", root.display()))?;
        let config = config::load_at(&root)
            .with_context(|| format!("failed to load {}", config::config_path_at(&root).display()))?;
        config.validate().context("invalid configuration")?;

        let generator = TemplateGenerator::new(config.templates_path(&root).as_deref())
            .context("failed to load documentation templates")?;
        let vcs = GitCli::new(config.docs_dir(&root));
        let orchestrator =
            pipeline::build_orchestrator(&root, &config, Arc::new(vcs), Arc::new(generator))
                .context("failed to set up the sync engine")?;
        Ok(Project {
            root,
            config,
            orchestrator,
        })
    }

    /// Resolve a user-supplied path against the current directory.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| self.root.join(path))
        };
        joined.canonicalize().unwrap_or(joined)
    }

    /// Display form of `path` relative to the project root.
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
