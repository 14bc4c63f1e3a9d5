//! Fingerprint cache: the persisted record of every tracked source file.
//!
//! Persists a JSON envelope at the configured cache path (by default
//! `<root>/.docmirror/cache.json`):
//!
//! ```text
//! { "version": 1, "created_at": …, "updated_at": …, "entries": { "<key>": {…} } }
//! ```
//!
//! A flat `{ "<key>": {…} }` object without the envelope is accepted on load.
//! Writes use the atomic `.tmp` + rename pattern. All mutation is in memory
//! until [`FingerprintCache::save`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use docmirror_core::types::{FileFingerprint, FAST_DIGEST_LEN, STRONG_DIGEST_LEN};

use crate::error::{io_err, SyncError};

/// Version written into the envelope.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Cache shared between the detector, workers and the batch aggregator.
pub type SharedCache = Arc<RwLock<FingerprintCache>>;

/// Normalise a path into a cache key: forward slashes, no leading `./`.
pub fn normalize_key(path: &Path) -> String {
    let key = path.to_string_lossy().replace('\\', "/");
    let mut key = key.as_str();
    while let Some(rest) = key.strip_prefix("./") {
        key = rest;
    }
    key.to_string()
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    entries: &'a BTreeMap<String, FileFingerprint>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CacheCompat {
    Structured(CacheStructuredCompat),
    Legacy(BTreeMap<String, serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct CacheStructuredCompat {
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<u32>,
    created_at: Option<DateTime<Utc>>,
    entries: BTreeMap<String, serde_json::Value>,
}

/// A problem found by [`FingerprintCache::validate_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityIssue {
    pub key: String,
    pub problem: String,
}

/// In-memory fingerprint cache bound to one file on disk.
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    path: PathBuf,
    entries: BTreeMap<String, FileFingerprint>,
    created_at: DateTime<Utc>,
    modified: bool,
}

impl FingerprintCache {
    /// An empty cache that will persist to `path`. Nothing is read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FingerprintCache {
            path: path.into(),
            entries: BTreeMap::new(),
            created_at: Utc::now(),
            modified: false,
        }
    }

    /// Open the cache at `path`, loading whatever is readable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(path);
        cache.load();
        cache
    }

    /// Wrap the cache for shared use.
    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    /// Replace in-memory state with the persisted entries.
    ///
    /// Never fails: a missing or corrupt file yields an empty cache and a
    /// corrupt individual entry is skipped with a warning.
    pub fn load(&mut self) {
        self.entries.clear();
        self.modified = false;

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read cache, starting empty");
                return;
            }
        };
        if contents.trim().is_empty() {
            return;
        }

        let raw = match serde_json::from_str::<CacheCompat>(&contents) {
            Ok(CacheCompat::Structured(file)) => {
                if let Some(created_at) = file.created_at {
                    self.created_at = created_at;
                }
                file.entries
            }
            Ok(CacheCompat::Legacy(entries)) => entries,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt cache, starting empty");
                return;
            }
        };

        for (key, value) in raw {
            match serde_json::from_value::<FileFingerprint>(value) {
                Ok(mut fp) => {
                    let key = normalize_key(Path::new(&key));
                    fp.path = key.clone();
                    self.entries.insert(key, fp);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping corrupt cache entry");
                }
            }
        }
        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "cache loaded");
    }

    /// Persist the cache if it changed since the last save (or `force`).
    ///
    /// Returns whether a write happened.
    pub fn save(&mut self, force: bool) -> Result<bool, SyncError> {
        if !self.modified && !force {
            return Ok(false);
        }
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }

        let file = CacheFileRef {
            version: CACHE_FORMAT_VERSION,
            created_at: self.created_at,
            updated_at: Utc::now(),
            entries: &self.entries,
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }

        self.modified = false;
        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "cache saved");
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<&FileFingerprint> {
        self.entries.get(&normalize_key(Path::new(key)))
    }

    /// Store `fp` under `key`.
    ///
    /// `last_processed` never moves backwards: an older timestamp than the
    /// stored one is replaced by the stored one.
    pub fn set(&mut self, key: &str, mut fp: FileFingerprint) {
        let key = normalize_key(Path::new(key));
        if let Some(existing) = self.entries.get(&key) {
            if existing.last_processed > fp.last_processed {
                fp.last_processed = existing.last_processed;
            }
        }
        fp.path = key.clone();
        self.entries.insert(key, fp);
        self.modified = true;
    }

    /// Put back a previously captured entry (or its absence) verbatim.
    ///
    /// Unlike [`set`](Self::set) this may move `last_processed` backwards; it
    /// exists for undoing a failed run.
    pub fn restore_entry(&mut self, key: &str, previous: Option<FileFingerprint>) {
        let key = normalize_key(Path::new(key));
        match previous {
            Some(fp) => {
                self.entries.insert(key, fp);
            }
            None => {
                self.entries.remove(&key);
            }
        }
        self.modified = true;
    }

    /// Remove an entry; true when it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(&normalize_key(Path::new(key))).is_some();
        if removed {
            self.modified = true;
        }
        removed
    }

    /// Drop entries missing from `existing` or not processed within `max_age`.
    pub fn cleanup_stale(&mut self, existing: &HashSet<String>, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let before = self.entries.len();
        self.entries
            .retain(|key, fp| existing.contains(key) && fp.last_processed >= cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.modified = true;
            tracing::info!(removed, "removed stale cache entries");
        }
        removed
    }

    /// Check every entry for malformed digests, timestamps and key mismatches.
    pub fn validate_integrity(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        for (key, fp) in &self.entries {
            let mut flag = |problem: String| {
                issues.push(IntegrityIssue {
                    key: key.clone(),
                    problem,
                })
            };
            if !is_hex_of_len(&fp.fast_digest, FAST_DIGEST_LEN) {
                flag(format!("fast digest is not {FAST_DIGEST_LEN} hex chars"));
            }
            if !is_hex_of_len(&fp.strong_digest, STRONG_DIGEST_LEN) {
                flag(format!("strong digest is not {STRONG_DIGEST_LEN} hex chars"));
            }
            if !(fp.mtime.is_finite() && fp.mtime > 0.0) {
                flag(format!("mtime {} is not a positive timestamp", fp.mtime));
            }
            if fp.last_processed.timestamp() <= 0 {
                flag("last_processed is not a positive timestamp".to_string());
            }
            if &fp.path != key {
                flag(format!("entry path '{}' does not match key", fp.path));
            }
        }
        issues
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileFingerprint)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.modified = true;
        }
    }

    /// True when in-memory state differs from the last load or save.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
