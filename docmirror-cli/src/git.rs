//! `git` command-line adapter for [`VersionControl`].
//!
//! Every command runs inside the docs tree. Restore points are tags and a
//! rollback is `git reset --hard <tag>`, which resets the whole working tree,
//! so the docs tree is best kept in a repository of its own.

use std::path::{Path, PathBuf};
use std::process::Command;

use docmirror_core::{VcsError, VersionControl};

/// Shells out to `git` in a fixed directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
}

impl GitCli {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        GitCli { dir: dir.into() }
    }
}

/// Run a git command in `dir` and return trimmed stdout.
fn git_cmd(dir: &Path, args: &[&str]) -> Result<String, VcsError> {
    let out = Command::new("git").args(args).current_dir(dir).output()?;
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_owned())
    } else {
        Err(VcsError::Command {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            exit_code: out.status.code(),
        })
    }
}

impl VersionControl for GitCli {
    fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        git_cmd(&self.dir, &args).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<String, VcsError> {
        git_cmd(&self.dir, &["commit", "--quiet", "-m", message])?;
        git_cmd(&self.dir, &["rev-parse", "HEAD"])
    }

    fn tag(&self, name: &str, message: Option<&str>, target: Option<&str>) -> Result<String, VcsError> {
        let mut args = vec!["tag"];
        if let Some(message) = message {
            args.extend(["-a", "-m", message]);
        }
        args.push(name);
        if let Some(target) = target {
            args.push(target);
        }
        git_cmd(&self.dir, &args)?;
        tracing::debug!(tag = name, "restore point tagged");
        Ok(name.to_string())
    }

    fn reset(&self, target: &str, hard: bool) -> Result<(), VcsError> {
        let mode = if hard { "--hard" } else { "--mixed" };
        git_cmd(&self.dir, &["reset", "--quiet", mode, target]).map(|_| ())
    }

    /// Untracked files (backups among them) do not make the tree dirty.
    fn is_clean(&self) -> Result<bool, VcsError> {
        let status = git_cmd(&self.dir, &["status", "--porcelain", "--untracked-files=no", "--", "."])?;
        Ok(status.is_empty())
    }

    fn object_exists(&self, reference: &str) -> Result<bool, VcsError> {
        let rev = format!("{reference}^{{commit}}");
        match git_cmd(&self.dir, &["rev-parse", "--verify", "--quiet", &rev]) {
            Ok(_) => Ok(true),
            Err(VcsError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
