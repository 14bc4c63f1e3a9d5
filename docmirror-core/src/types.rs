//! Domain types shared by the docmirror crates.
//!
//! All types are serializable via serde; the fingerprint is persisted as JSON by
//! the sync cache and the enums appear as keys in the YAML configuration.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Length of the hex-encoded fast (MD5) digest.
pub const FAST_DIGEST_LEN: usize = 32;

/// Length of the hex-encoded strong (SHA-256) digest.
pub const STRONG_DIGEST_LEN: usize = 64;

/// Last-known state of a tracked source file.
///
/// `path` is the cache key (relative, forward-slash separated). It is not
/// written inside the persisted entry; the cache fills it from the map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFingerprint {
    #[serde(skip)]
    pub path: String,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: f64,
    pub fast_digest: String,
    pub strong_digest: String,
    /// Accepts RFC 3339 or legacy epoch seconds on load; always written as RFC 3339.
    #[serde(deserialize_with = "timestamp_or_epoch")]
    pub last_processed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl FileFingerprint {
    /// True when the stored size and mtime equal the given stat values (the cheap check).
    pub fn same_stat(&self, size: u64, mtime: f64) -> bool {
        self.size == size && self.mtime == mtime
    }

    /// True when both digests match `other`.
    pub fn same_content(&self, other: &FileFingerprint) -> bool {
        self.fast_digest == other.fast_digest && self.strong_digest == other.strong_digest
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampCompat {
    Rfc3339(DateTime<Utc>),
    Epoch(f64),
}

fn timestamp_or_epoch<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match TimestampCompat::deserialize(deserializer)? {
        TimestampCompat::Rfc3339(ts) => Ok(ts),
        TimestampCompat::Epoch(secs) => {
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            DateTime::from_timestamp(whole, nanos.min(999_999_999))
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp {secs} out of range")))
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// Why an existing documentation file conflicts with freshly generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    FileExists,
    ContentModified,
    StructuralConflict,
    PermissionDenied,
    SizeLimit,
}

impl ConflictKind {
    /// All conflict kinds in a stable order.
    pub fn all() -> &'static [ConflictKind] {
        &[
            ConflictKind::FileExists,
            ConflictKind::ContentModified,
            ConflictKind::StructuralConflict,
            ConflictKind::PermissionDenied,
            ConflictKind::SizeLimit,
        ]
    }

    /// Strategy applied when the caller does not choose one.
    pub fn default_strategy(&self) -> ResolutionStrategy {
        match self {
            ConflictKind::FileExists | ConflictKind::ContentModified => {
                ResolutionStrategy::MergeIntelligent
            }
            ConflictKind::StructuralConflict => ResolutionStrategy::KeepTheirs,
            ConflictKind::PermissionDenied | ConflictKind::SizeLimit => ResolutionStrategy::Skip,
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::FileExists => write!(f, "file_exists"),
            ConflictKind::ContentModified => write!(f, "content_modified"),
            ConflictKind::StructuralConflict => write!(f, "structural_conflict"),
            ConflictKind::PermissionDenied => write!(f, "permission_denied"),
            ConflictKind::SizeLimit => write!(f, "size_limit"),
        }
    }
}

/// How a conflict is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the existing file untouched.
    KeepOurs,
    /// Overwrite with the generated content.
    KeepTheirs,
    /// Keep existing content and append sections only present in the new content.
    MergeIntelligent,
    MergeAppend,
    MergePrepend,
    /// Leave the file alone and do not record it as processed.
    Skip,
    /// Ask an interactive handler; falls back to `MergeIntelligent`.
    Prompt,
    /// Overwrite with the generated content, always keeping a backup copy.
    BackupAndReplace,
}

impl ResolutionStrategy {
    /// All strategies in a stable order.
    pub fn all() -> &'static [ResolutionStrategy] {
        &[
            ResolutionStrategy::KeepOurs,
            ResolutionStrategy::KeepTheirs,
            ResolutionStrategy::MergeIntelligent,
            ResolutionStrategy::MergeAppend,
            ResolutionStrategy::MergePrepend,
            ResolutionStrategy::Skip,
            ResolutionStrategy::Prompt,
            ResolutionStrategy::BackupAndReplace,
        ]
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStrategy::KeepOurs => write!(f, "keep_ours"),
            ResolutionStrategy::KeepTheirs => write!(f, "keep_theirs"),
            ResolutionStrategy::MergeIntelligent => write!(f, "merge_intelligent"),
            ResolutionStrategy::MergeAppend => write!(f, "merge_append"),
            ResolutionStrategy::MergePrepend => write!(f, "merge_prepend"),
            ResolutionStrategy::Skip => write!(f, "skip"),
            ResolutionStrategy::Prompt => write!(f, "prompt"),
            ResolutionStrategy::BackupAndReplace => write!(f, "backup_and_replace"),
        }
    }
}

/// Severity attached to a structural merge conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategies_per_kind() {
        assert_eq!(
            ConflictKind::FileExists.default_strategy(),
            ResolutionStrategy::MergeIntelligent
        );
        assert_eq!(
            ConflictKind::ContentModified.default_strategy(),
            ResolutionStrategy::MergeIntelligent
        );
        assert_eq!(
            ConflictKind::StructuralConflict.default_strategy(),
            ResolutionStrategy::KeepTheirs
        );
        assert_eq!(ConflictKind::PermissionDenied.default_strategy(), ResolutionStrategy::Skip);
        assert_eq!(ConflictKind::SizeLimit.default_strategy(), ResolutionStrategy::Skip);
    }

    #[test]
    fn display_matches_serde_names() {
        for strategy in ResolutionStrategy::all() {
            let yaml = serde_yaml::to_string(strategy).expect("serialize");
            assert_eq!(yaml.trim(), strategy.to_string());
        }
        for kind in ConflictKind::all() {
            let yaml = serde_yaml::to_string(kind).expect("serialize");
            assert_eq!(yaml.trim(), kind.to_string());
        }
    }

    #[test]
    fn fingerprint_path_is_not_serialized() {
        let fp = FileFingerprint {
            path: "src/a.py".to_string(),
            size: 120,
            mtime: 1000.0,
            fast_digest: "ddd0".to_string(),
            strong_digest: "eee0".to_string(),
            last_processed: Utc::now(),
            metadata: BTreeMap::new(),
        };
        let yaml = serde_yaml::to_string(&fp).expect("serialize");
        assert!(!yaml.contains("src/a.py"));
        assert!(fp.same_stat(120, 1000.0));
        assert!(!fp.same_stat(121, 1000.0));
    }

    #[test]
    fn epoch_seconds_are_accepted_for_last_processed() {
        let yaml = "size: 120\nmtime: 1000.0\nfast_digest: ddd0\nstrong_digest: eee0\nlast_processed: 1000.0\n";
        let fp: FileFingerprint = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(fp.last_processed.timestamp(), 1000);
        assert!(fp.metadata.is_empty());
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
