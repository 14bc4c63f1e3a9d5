//! Per-project YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   .docmirror/
//!     config.yaml   (optional, defaults apply when absent)
//!     cache.json    (fingerprint cache, owned by docmirror-sync)
//! ```
//!
//! Every path in the file is interpreted relative to `<root>` unless absolute.
//! Functions take the project root explicitly (`*_at(root, …)`) so tests can
//! point them at a `TempDir`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{ConflictKind, ResolutionStrategy};

/// Directory holding docmirror state inside a project root.
pub const STATE_DIR: &str = ".docmirror";

/// Synchronization settings for one mirrored tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tree whose files are documented.
    pub source_root: PathBuf,
    /// Version-controlled documentation tree mirroring `source_root`.
    pub docs_root: PathBuf,
    /// Persisted fingerprint cache.
    pub cache_file: PathBuf,
    /// Extension appended to mirrored documentation files.
    pub doc_extension: String,
    /// Generated content larger than this (bytes) is a `SizeLimit` conflict.
    pub max_file_size: u64,
    /// Width of the batch worker pool.
    pub workers: usize,
    /// Copy existing documentation aside before overwriting it.
    pub create_backups: bool,
    /// Tag a restore point in the docs repository before mutating it.
    pub restore_points: bool,
    /// Refuse to run when the docs repository has uncommitted changes.
    pub require_clean: bool,
    /// Backups kept per documentation file; older ones are pruned.
    pub backup_retention: usize,
    /// Extra glob patterns excluded from change detection.
    pub ignore: Vec<String>,
    /// Finished runs kept in the run history.
    pub history_limit: usize,
    /// Active runs older than this are evicted as stale.
    pub stale_run_timeout_secs: u64,
    /// Cache entries not processed within this many days are dropped on cleanup.
    pub cache_max_age_days: u64,
    /// Per-kind overrides of the default resolution strategy.
    pub strategies: BTreeMap<ConflictKind, ResolutionStrategy>,
    /// Directory of `.tera` templates overriding the built-in ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
    /// First line prefix of every sync commit message.
    pub commit_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("src"),
            docs_root: PathBuf::from("docs"),
            cache_file: PathBuf::from(STATE_DIR).join("cache.json"),
            doc_extension: "md".to_string(),
            max_file_size: 1024 * 1024,
            workers: 4,
            create_backups: true,
            restore_points: true,
            require_clean: true,
            backup_retention: 5,
            ignore: Vec::new(),
            history_limit: 100,
            stale_run_timeout_secs: 60 * 60,
            cache_max_age_days: 90,
            strategies: BTreeMap::new(),
            templates_dir: None,
            commit_prefix: "docs: sync".to_string(),
        }
    }
}

impl SyncConfig {
    /// Absolute source tree for a project rooted at `root`.
    pub fn source_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.source_root)
    }

    /// Absolute documentation tree for a project rooted at `root`.
    pub fn docs_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.docs_root)
    }

    /// Absolute cache file path for a project rooted at `root`.
    pub fn cache_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.cache_file)
    }

    /// Absolute template override directory, if configured.
    pub fn templates_path(&self, root: &Path) -> Option<PathBuf> {
        self.templates_dir.as_deref().map(|dir| resolve(root, dir))
    }

    /// Strategy for `kind`: configured override, else the built-in default.
    pub fn strategy_for(&self, kind: ConflictKind) -> ResolutionStrategy {
        self.strategies
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_strategy())
    }

    /// Reject values the sync engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.doc_extension.is_empty() || self.doc_extension.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "doc_extension",
                message: format!("'{}' is not a plain file extension", self.doc_extension),
            });
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "history_limit",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<root>/.docmirror/config.yaml`. Pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join("config.yaml")
}

/// Load the configuration for the project at `root`.
///
/// A missing file yields [`SyncConfig::default`]. Malformed YAML returns
/// [`ConfigError::Parse`] carrying the file path; invalid values return
/// [`ConfigError::Invalid`].
pub fn load_at(root: &Path) -> Result<SyncConfig, ConfigError> {
    let path = config_path_at(root);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(SyncConfig::default());
    }
    let config: SyncConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// Atomically save the configuration for the project at `root`.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `rename`.
pub fn save_at(root: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    let path = config_path_at(root);
    let dir = root.join(STATE_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_file_name("config.yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_at(tmp.path()).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "workers: 8\ndocs_root: mirror\n").unwrap();

        let config = load_at(tmp.path()).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.docs_root, PathBuf::from("mirror"));
        assert_eq!(config.source_root, PathBuf::from("src"));
        assert!(config.create_backups);
    }

    #[test]
    fn strategy_overrides_apply_per_kind() {
        let mut config = SyncConfig::default();
        config
            .strategies
            .insert(ConflictKind::StructuralConflict, ResolutionStrategy::Prompt);
        assert_eq!(
            config.strategy_for(ConflictKind::StructuralConflict),
            ResolutionStrategy::Prompt
        );
        assert_eq!(
            config.strategy_for(ConflictKind::SizeLimit),
            ResolutionStrategy::Skip
        );
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let config = SyncConfig::default();
        let root = Path::new("/work/project");
        assert_eq!(config.source_dir(root), PathBuf::from("/work/project/src"));
        assert_eq!(
            config.cache_path(root),
            PathBuf::from("/work/project/.docmirror/cache.json")
        );
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = SyncConfig {
            workers: 0,
            ..SyncConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }
}
