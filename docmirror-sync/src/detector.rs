//! Change detection over the fingerprint cache.
//!
//! Two tiers:
//! 1. cheap: compare size and mtime with the cached entry, no hashing;
//! 2. deep: stream the file through MD5 and SHA-256 and compare digests.
//!
//! Cache keys are paths relative to the detector root, forward-slash separated.

use std::collections::HashSet;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use chrono::Utc;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use docmirror_core::{FileFingerprint, IgnoreMatcher};

use crate::error::{io_err, SyncError};
use crate::fingerprint::{normalize_key, SharedCache};

const CHUNK_SIZE: usize = 64 * 1024;

/// Classification of a directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    pub changed: Vec<PathBuf>,
    pub new: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    /// Previously tracked files no longer on disk; already removed from the cache.
    pub deleted: Vec<PathBuf>,
}

impl ChangeReport {
    /// Files that need (re)processing: new followed by changed.
    pub fn needing_processing(&self) -> Vec<PathBuf> {
        self.new.iter().chain(self.changed.iter()).cloned().collect()
    }
}

/// Decides which files need re-processing.
#[derive(Clone)]
pub struct ChangeDetector {
    root: PathBuf,
    cache: SharedCache,
    ignore: Arc<dyn IgnoreMatcher>,
    excluded: Vec<PathBuf>,
}

impl ChangeDetector {
    pub fn new(root: impl Into<PathBuf>, cache: SharedCache, ignore: Arc<dyn IgnoreMatcher>) -> Self {
        ChangeDetector {
            root: root.into(),
            cache,
            ignore,
            excluded: Vec::new(),
        }
    }

    /// Never descend into `dir` (absolute, or relative to the root).
    pub fn exclude(mut self, dir: impl AsRef<Path>) -> Self {
        self.excluded.push(self.absolute(dir.as_ref()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Cache key for `path`.
    pub fn key_for(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        normalize_key(rel)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Stream `path` through both digests.
    pub fn fingerprint_of(&self, path: &Path) -> Result<FileFingerprint, SyncError> {
        let abs = self.absolute(path);
        let hash_err = |source: std::io::Error| SyncError::HashComputation {
            path: abs.clone(),
            source,
        };

        let mut file = std::fs::File::open(&abs).map_err(hash_err)?;
        let meta = file.metadata().map_err(hash_err)?;
        let mut fast = md5::Context::new();
        let mut strong = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).map_err(hash_err)?;
            if n == 0 {
                break;
            }
            fast.consume(&buf[..n]);
            strong.update(&buf[..n]);
        }

        Ok(FileFingerprint {
            path: self.key_for(&abs),
            size: meta.len(),
            mtime: mtime_secs(&meta),
            fast_digest: format!("{:x}", fast.compute()),
            strong_digest: hex::encode(strong.finalize()),
            last_processed: Utc::now(),
            metadata: Default::default(),
        })
    }

    /// Cheap check: size and mtime against the cache. No hashing.
    pub fn has_changed(&self, path: &Path) -> bool {
        let abs = self.absolute(path);
        let Ok(meta) = std::fs::metadata(&abs) else {
            return true;
        };
        let key = self.key_for(&abs);
        let cache = self.cache.read();
        match cache.get(&key) {
            Some(entry) => !entry.same_stat(meta.len(), mtime_secs(&meta)),
            None => true,
        }
    }

    /// Deep check: always recompute digests. Hash failures count as changed.
    pub fn has_changed_deep(&self, path: &Path) -> bool {
        let abs = self.absolute(path);
        let current = match self.fingerprint_of(&abs) {
            Ok(fp) => fp,
            Err(e) => {
                tracing::debug!(path = %abs.display(), error = %e, "hash failed, treating as changed");
                return true;
            }
        };
        let cache = self.cache.read();
        match cache.get(&current.path) {
            Some(entry) => !entry.same_content(&current),
            None => true,
        }
    }

    /// Fingerprint `path` and store it in the cache.
    pub fn update_cache(&self, path: &Path) -> Result<FileFingerprint, SyncError> {
        let fp = self.fingerprint_of(path)?;
        let key = fp.path.clone();
        self.cache.write().set(&key, fp.clone());
        Ok(fp)
    }

    /// Walk `dir` and classify every non-ignored file.
    ///
    /// Tracked files under `dir` that no longer exist are reported as deleted
    /// and removed from the cache. `max_files` caps how many files are
    /// enumerated.
    pub fn detect_in_directory(
        &self,
        dir: &Path,
        deep: bool,
        max_files: Option<usize>,
    ) -> Result<ChangeReport, SyncError> {
        let dir = self.absolute(dir);
        if !dir.is_dir() {
            return Err(io_err(
                &dir,
                std::io::Error::new(ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut report = ChangeReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let walker = WalkDir::new(&dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_pruned(e.path()));

        let mut enumerated = 0usize;
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if max_files.is_some_and(|max| enumerated >= max) {
                break;
            }
            enumerated += 1;

            let path = entry.into_path();
            let key = self.key_for(&path);
            seen.insert(key.clone());

            let tracked = self.cache.read().get(&key).is_some();
            if !path.exists() {
                if tracked {
                    self.cache.write().remove(&key);
                    report.deleted.push(path);
                }
                continue;
            }
            if !tracked {
                report.new.push(path);
                continue;
            }
            let changed = if deep {
                match self.fingerprint_of(&path) {
                    Ok(current) => self
                        .cache
                        .read()
                        .get(&key)
                        .map_or(true, |entry| !entry.same_content(&current)),
                    Err(SyncError::HashComputation { source, .. })
                        if source.kind() == ErrorKind::NotFound =>
                    {
                        self.cache.write().remove(&key);
                        report.deleted.push(path);
                        continue;
                    }
                    Err(_) => true,
                }
            } else {
                self.has_changed(&path)
            };
            if changed {
                report.changed.push(path);
            } else {
                report.unchanged.push(path);
            }
        }

        let prefix = self.key_for(&dir);
        let vanished: Vec<String> = {
            let cache = self.cache.read();
            cache
                .keys()
                .filter(|k| is_under(k, &prefix) && !seen.contains(*k))
                .filter(|k| !self.root.join(k.as_str()).exists())
                .cloned()
                .collect()
        };
        if !vanished.is_empty() {
            let mut cache = self.cache.write();
            for key in vanished {
                cache.remove(&key);
                report.deleted.push(self.root.join(&key));
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            new = report.new.len(),
            changed = report.changed.len(),
            unchanged = report.unchanged.len(),
            deleted = report.deleted.len(),
            "directory scan complete"
        );
        Ok(report)
    }

    /// Filter `paths` down to those that need processing.
    pub fn files_needing_processing(&self, paths: &[PathBuf], force_all: bool) -> Vec<PathBuf> {
        if force_all {
            return paths.to_vec();
        }
        paths
            .iter()
            .filter(|p| self.has_changed(p))
            .cloned()
            .collect()
    }

    fn is_pruned(&self, path: &Path) -> bool {
        if self.excluded.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        self.ignore.should_ignore(rel)
    }
}

fn is_under(key: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || key == prefix
        || (key.starts_with(prefix) && key.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Modification time as fractional seconds since the Unix epoch (0.0 when unavailable).
pub(crate) fn mtime_secs(meta: &std::fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintCache;
    use crate::ignore::GlobIgnore;
    use docmirror_core::IgnoreNothing;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn detector(root: &Path) -> ChangeDetector {
        let cache = FingerprintCache::new(root.join(".docmirror/cache.json")).into_shared();
        ChangeDetector::new(root, cache, Arc::new(GlobIgnore::with_defaults(&[]).unwrap()))
    }

    fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn identical_bytes_hash_identically() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a.txt", "same bytes");
        let b = write(tmp.path(), "b.txt", "same bytes");
        let d = detector(tmp.path());
        let fa = d.fingerprint_of(&a).unwrap();
        let fb = d.fingerprint_of(&b).unwrap();
        assert_eq!(fa.fast_digest, fb.fast_digest);
        assert_eq!(fa.strong_digest, fb.strong_digest);
        assert_eq!(fa.fast_digest.len(), 32);
        assert_eq!(fa.strong_digest.len(), 64);
    }

    #[test]
    fn known_digests_for_empty_file() {
        let tmp = TempDir::new().unwrap();
        let p = write(tmp.path(), "empty", "");
        let fp = detector(tmp.path()).fingerprint_of(&p).unwrap();
        assert_eq!(fp.fast_digest, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            fp.strong_digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.size, 0);
    }

    #[test]
    fn missing_file_fails_to_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let err = detector(tmp.path())
            .fingerprint_of(Path::new("nope.rs"))
            .unwrap_err();
        assert!(matches!(err, SyncError::HashComputation { .. }));
    }

    #[test]
    fn unchanged_after_update_until_modified() {
        let tmp = TempDir::new().unwrap();
        let p = write(tmp.path(), "src/a.py", "print(1)\n");
        let d = detector(tmp.path());
        assert!(d.has_changed(&p));
        d.update_cache(&p).unwrap();
        for _ in 0..3 {
            assert!(!d.has_changed(&p));
            assert!(!d.has_changed_deep(&p));
        }
        std::fs::write(&p, "print(22)\n").unwrap();
        assert!(d.has_changed(&p));
        assert!(d.has_changed_deep(&p));
    }

    #[test]
    fn saved_cache_reloads_equal_and_unchanged() {
        let tmp = TempDir::new().unwrap();
        let d = detector(tmp.path());
        let mut paths = Vec::new();
        for i in 0..50u32 {
            let p = write(tmp.path(), &format!("src/f{i}.py"), &format!("x = {i}\n"));
            // Sub-second mtimes that need all 17 significant digits.
            let mtime = FileTime::from_unix_time(1_792_268_874 + i64::from(i), 511_330_100 + i * 7_919);
            filetime::set_file_mtime(&p, mtime).unwrap();
            d.update_cache(&p).unwrap();
            paths.push(p);
        }
        let cache_path = d.cache().read().path().to_path_buf();
        d.cache().write().save(false).unwrap();

        let reloaded = FingerprintCache::open(&cache_path);
        let before: Vec<_> = d.cache().read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let after: Vec<_> = reloaded.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(before, after);

        let fresh = ChangeDetector::new(
            tmp.path(),
            reloaded.into_shared(),
            Arc::new(GlobIgnore::with_defaults(&[]).unwrap()),
        );
        let changed: Vec<_> = paths.iter().filter(|p| fresh.has_changed(p)).collect();
        assert!(changed.is_empty(), "reported changed after reload: {changed:?}");
    }

    #[test]
    fn touch_without_content_change_is_cheap_changed_but_deep_unchanged() {
        let tmp = TempDir::new().unwrap();
        let p = write(tmp.path(), "a.rs", "fn a() {}\n");
        let d = detector(tmp.path());
        d.update_cache(&p).unwrap();
        filetime::set_file_mtime(&p, FileTime::from_unix_time(2_000_000_000, 0)).unwrap();
        assert!(d.has_changed(&p));
        assert!(!d.has_changed_deep(&p));
    }

    #[test]
    fn keys_are_relative_to_root() {
        let tmp = TempDir::new().unwrap();
        let p = write(tmp.path(), "pkg/sub/m.py", "x");
        let d = detector(tmp.path());
        assert_eq!(d.update_cache(&p).unwrap().path, "pkg/sub/m.py");
        assert!(d.cache().read().get("pkg/sub/m.py").is_some());
    }

    #[test]
    fn directory_scan_classifies_files() {
        let tmp = TempDir::new().unwrap();
        let same = write(tmp.path(), "src/same.py", "a");
        let edited = write(tmp.path(), "src/edited.py", "b");
        let gone = write(tmp.path(), "src/gone.py", "c");
        let d = detector(tmp.path());
        for p in [&same, &edited, &gone] {
            d.update_cache(p).unwrap();
        }
        std::fs::write(&edited, "bb").unwrap();
        std::fs::remove_file(&gone).unwrap();
        let fresh = write(tmp.path(), "src/fresh.py", "d");
        write(tmp.path(), "src/__pycache__/same.pyc", "junk");

        let report = d
            .detect_in_directory(&tmp.path().join("src"), false, None)
            .unwrap();
        assert_eq!(report.new, vec![fresh]);
        assert_eq!(report.changed, vec![edited]);
        assert_eq!(report.unchanged, vec![same]);
        assert_eq!(report.deleted, vec![gone]);
        assert!(d.cache().read().get("src/gone.py").is_none());
    }

    #[test]
    fn excluded_directory_is_not_scanned() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "docs/a.py.md", "doc");
        let src = write(tmp.path(), "a.py", "x");
        let d = detector(tmp.path()).exclude("docs");
        let report = d.detect_in_directory(tmp.path(), false, None).unwrap();
        assert_eq!(report.new, vec![src]);
    }

    #[test]
    fn max_files_caps_enumeration() {
        let tmp = TempDir::new().unwrap();
        for i in 0..5 {
            write(tmp.path(), &format!("f{i}.txt"), "x");
        }
        let cache = FingerprintCache::new(tmp.path().join("c.json")).into_shared();
        let d = ChangeDetector::new(tmp.path(), cache, Arc::new(IgnoreNothing));
        let report = d.detect_in_directory(tmp.path(), true, Some(2)).unwrap();
        assert_eq!(report.new.len(), 2);
    }

    #[test]
    fn force_all_returns_every_path() {
        let tmp = TempDir::new().unwrap();
        let p = write(tmp.path(), "a.rs", "x");
        let d = detector(tmp.path());
        d.update_cache(&p).unwrap();
        assert!(d.files_needing_processing(&[p.clone()], false).is_empty());
        assert_eq!(d.files_needing_processing(&[p.clone()], true), vec![p]);
    }
}
