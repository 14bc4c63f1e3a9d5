//! Atomic file writes and backup housekeeping for documentation targets.
//!
//! ## `atomic_write` protocol
//!
//! 1. Normalise line endings to LF.
//! 2. Ensure the parent directory exists.
//! 3. Write to `<path>.docmirror.tmp`.
//! 4. Rename to the final path (atomic on POSIX); remove the tmp on failure.
//!
//! Backups are siblings named `<stem>.backup_<YYYYmmdd_HHMMSS_ffffff><.ext>`,
//! so lexical order is chronological order.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{io_err, SyncError};

/// Suffix of in-flight temporary files.
pub const TMP_SUFFIX: &str = ".docmirror.tmp";

/// Marker between the stem and the timestamp of a backup file name.
pub const BACKUP_MARKER: &str = ".backup_";

/// Atomically replace `path` with `content`.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), SyncError> {
    let tmp = PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()));
    atomic_write_with_tmp(path, content, &tmp)
}

/// The exact text [`atomic_write`] puts on disk for `content`.
pub fn normalize_newlines(content: &str) -> String {
    content.replace("\r\n", "\n")
}

fn atomic_write_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<(), SyncError> {
    let normalized = normalize_newlines(content);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, normalized).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    tracing::debug!(path = %path.display(), "wrote");
    Ok(())
}

fn backup_parts(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// Copy `content` (the current text of `path`) to a fresh backup sibling.
pub fn write_backup(path: &Path, content: &str) -> Result<PathBuf, SyncError> {
    let (stem, ext) = backup_parts(path);
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
    let backup = path.with_file_name(format!("{stem}{BACKUP_MARKER}{stamp}{ext}"));
    std::fs::write(&backup, content).map_err(|e| io_err(&backup, e))?;
    tracing::info!(path = %path.display(), backup = %backup.display(), "backup written");
    Ok(backup)
}

/// Backups of `path`, oldest first.
pub fn list_backups(path: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let Some(dir) = path.parent() else {
        return Ok(vec![]);
    };
    let (stem, ext) = backup_parts(path);
    let prefix = format!("{stem}{BACKUP_MARKER}");

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(io_err(dir, e)),
    };
    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(&ext) && name.len() > prefix.len() + ext.len()
        {
            backups.push(entry.path());
        }
    }
    backups.sort();
    Ok(backups)
}

/// Delete all but the newest `keep` backups of `path`. Returns how many were removed.
pub fn prune_backups(path: &Path, keep: usize) -> Result<usize, SyncError> {
    let backups = list_backups(path)?;
    let excess = backups.len().saturating_sub(keep);
    for old in &backups[..excess] {
        std::fs::remove_file(old).map_err(|e| io_err(old, e))?;
    }
    Ok(excess)
}

/// Remove leftover `*.docmirror.tmp` siblings of `targets`. Returns how many were removed.
pub fn remove_stray_tmp(targets: &[PathBuf]) -> Result<usize, SyncError> {
    let mut removed = 0;
    for target in targets {
        let tmp = PathBuf::from(format!("{}{TMP_SUFFIX}", target.display()));
        match std::fs::remove_file(&tmp) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&tmp, e)),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents_and_normalises() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deep").join("dir").join("a.md");
        atomic_write(&path, "one\r\ntwo\r\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        assert!(!tmp.path().join("deep/dir/a.md.docmirror.tmp").exists());
    }

    #[test]
    fn failed_rename_cleans_up_tmp() {
        let tmp = TempDir::new().unwrap();
        // A directory at the target path makes the rename fail.
        let path = tmp.path().join("target.md");
        std::fs::create_dir_all(path.join("child")).unwrap();
        let tmp_file = tmp.path().join("target.md.tmp");
        let err = atomic_write_with_tmp(&path, "x", &tmp_file).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
        assert!(!tmp_file.exists());
    }

    #[test]
    fn backup_name_keeps_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.py.md");
        let backup = write_backup(&path, "old").unwrap();
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("a.py.backup_"), "{name}");
        assert!(name.ends_with(".md"), "{name}");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "old");
    }

    #[test]
    fn prune_keeps_newest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        for stamp in ["20260101_000000_000001", "20260102_000000_000001", "20260103_000000_000001"] {
            std::fs::write(tmp.path().join(format!("a.backup_{stamp}.md")), stamp).unwrap();
        }
        std::fs::write(tmp.path().join("b.backup_20260101_000000_000001.md"), "other").unwrap();

        assert_eq!(prune_backups(&path, 1).unwrap(), 2);
        let left = list_backups(&path).unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].ends_with("a.backup_20260103_000000_000001.md"));
        assert!(tmp.path().join("b.backup_20260101_000000_000001.md").exists());
    }

    #[test]
    fn stray_tmp_files_are_removed() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a.md");
        std::fs::write(tmp.path().join("a.md.docmirror.tmp"), "partial").unwrap();
        assert_eq!(remove_stray_tmp(&[target.clone()]).unwrap(), 1);
        assert_eq!(remove_stray_tmp(&[target]).unwrap(), 0);
    }
}
