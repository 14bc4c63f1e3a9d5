//! Conflict detection and resolution for documentation targets.
//!
//! A target that does not exist yet is not a conflict; the caller writes it
//! directly. An existing target yields a [`ConflictRecord`], which is consumed
//! exactly once by [`ConflictResolver::resolve`].
//!
//! Detection priority:
//! 1. read-only or unreadable → `PermissionDenied`
//! 2. new content over the size limit → `SizeLimit`
//! 3. identical content → `FileExists`
//! 4. any high-severity merge conflict → `StructuralConflict`
//! 5. non-empty existing content → `ContentModified`, else `FileExists`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use docmirror_core::{ConflictKind, ResolutionStrategy, Severity, SyncConfig};

use crate::error::SyncError;
use crate::merger::{ContentMerger, MergeConflict, MergeStrategy};
use crate::writer;

/// Similarity above which merging is recommended over replacing.
const MERGE_RECOMMEND_THRESHOLD: f64 = 0.5;

/// An existing target that disagrees with freshly generated content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    pub kind: ConflictKind,
    pub file_path: PathBuf,
    pub existing_content: Option<String>,
    pub new_content: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
    pub merge_conflicts: Vec<MergeConflict>,
}

impl ConflictRecord {
    pub fn has_high_severity(&self) -> bool {
        self.merge_conflicts
            .iter()
            .any(|c| c.severity == Severity::High)
    }
}

/// Result of resolving one [`ConflictRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionOutcome {
    pub success: bool,
    pub strategy_used: ResolutionStrategy,
    pub file_path: PathBuf,
    /// Exact text written to `file_path`; `None` when nothing was written.
    pub final_content: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub written: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ResolutionOutcome {
    fn new(strategy: ResolutionStrategy, path: &Path) -> Self {
        ResolutionOutcome {
            success: true,
            strategy_used: strategy,
            file_path: path.to_path_buf(),
            final_content: None,
            backup_path: None,
            written: false,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn fail(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.errors.push(error.into());
        self
    }
}

/// Aggregate view of a set of conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ConflictKind, usize>,
    pub recommended_counts: BTreeMap<ResolutionStrategy, usize>,
    pub requires_manual_review_count: usize,
}

/// How `strategy` combines existing and generated text; `None` when it
/// leaves the target alone.
pub fn merge_strategy_for(strategy: ResolutionStrategy) -> Option<MergeStrategy> {
    match strategy {
        ResolutionStrategy::Skip | ResolutionStrategy::KeepOurs => None,
        ResolutionStrategy::KeepTheirs | ResolutionStrategy::BackupAndReplace => {
            Some(MergeStrategy::Replace)
        }
        ResolutionStrategy::MergeIntelligent | ResolutionStrategy::Prompt => {
            Some(MergeStrategy::Intelligent)
        }
        ResolutionStrategy::MergeAppend => Some(MergeStrategy::Append),
        ResolutionStrategy::MergePrepend => Some(MergeStrategy::Prepend),
    }
}

/// Interactive handler consulted for the `Prompt` strategy.
pub trait ConflictPrompter: Send + Sync {
    /// Pick a strategy for `conflict`; `None` falls back to intelligent merge.
    fn choose(&self, conflict: &ConflictRecord) -> Option<ResolutionStrategy>;
}

/// Detects and resolves conflicts between generated and existing documentation.
#[derive(Clone)]
pub struct ConflictResolver {
    merger: ContentMerger,
    max_file_size: u64,
    overrides: BTreeMap<ConflictKind, ResolutionStrategy>,
    prompter: Option<Arc<dyn ConflictPrompter>>,
}

impl ConflictResolver {
    pub fn new(max_file_size: u64) -> Self {
        ConflictResolver {
            merger: ContentMerger,
            max_file_size,
            overrides: BTreeMap::new(),
            prompter: None,
        }
    }

    /// Size limit and per-kind strategy overrides from configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.max_file_size).with_overrides(config.strategies.clone())
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<ConflictKind, ResolutionStrategy>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn ConflictPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn merger(&self) -> &ContentMerger {
        &self.merger
    }

    /// Configured override for `kind`, else its built-in default.
    pub fn strategy_for(&self, kind: ConflictKind) -> ResolutionStrategy {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_strategy())
    }

    /// Classify an existing target. `None` when `path` does not exist.
    ///
    /// `new_content` is compared and stored with LF line endings, as it would
    /// be written.
    pub fn detect(&self, path: &Path, new_content: &str) -> Option<ConflictRecord> {
        let meta = std::fs::metadata(path).ok()?;
        let new_content = writer::normalize_newlines(new_content);
        let new_content = new_content.as_str();
        let mut record = ConflictRecord {
            kind: ConflictKind::FileExists,
            file_path: path.to_path_buf(),
            existing_content: None,
            new_content: Some(new_content.to_string()),
            detected_at: Utc::now(),
            metadata: BTreeMap::new(),
            merge_conflicts: Vec::new(),
        };
        record
            .metadata
            .insert("new_size".to_string(), new_content.len().to_string());

        if meta.permissions().readonly() {
            record.kind = ConflictKind::PermissionDenied;
            record
                .metadata
                .insert("reason".to_string(), "read-only".to_string());
            return Some(record);
        }
        let existing = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                record.kind = ConflictKind::PermissionDenied;
                record.metadata.insert("reason".to_string(), e.to_string());
                return Some(record);
            }
        };
        record
            .metadata
            .insert("existing_size".to_string(), existing.len().to_string());

        if new_content.len() as u64 > self.max_file_size {
            record.kind = ConflictKind::SizeLimit;
            let reason = self.size_limit_error(path, new_content);
            record.metadata.insert("reason".to_string(), reason.to_string());
            record.existing_content = Some(existing);
            return Some(record);
        }
        if existing == new_content {
            record.existing_content = Some(existing);
            return Some(record);
        }

        record.merge_conflicts = self.merger.detect_conflicts(&existing, new_content);
        record.kind = if record.has_high_severity() {
            let reason = SyncError::StructuralConflict {
                path: path.to_path_buf(),
            };
            record.metadata.insert("reason".to_string(), reason.to_string());
            ConflictKind::StructuralConflict
        } else if !existing.trim().is_empty() {
            ConflictKind::ContentModified
        } else {
            ConflictKind::FileExists
        };
        record.existing_content = Some(existing);
        Some(record)
    }

    /// Resolve `conflict` with `strategy` (or the default for its kind).
    ///
    /// `Skip` and `KeepOurs` never touch the file. When the resolved content
    /// equals the existing content nothing is written and no backup is taken.
    pub fn resolve(
        &self,
        conflict: ConflictRecord,
        strategy: Option<ResolutionStrategy>,
        create_backup: bool,
    ) -> ResolutionOutcome {
        let requested = strategy.unwrap_or_else(|| self.strategy_for(conflict.kind));
        let mut warnings = Vec::new();
        let effective = if requested == ResolutionStrategy::Prompt {
            self.prompt(&conflict, &mut warnings)
        } else {
            requested
        };

        let mut outcome = ResolutionOutcome::new(effective, &conflict.file_path);
        outcome.warnings = warnings;
        let path = conflict.file_path.as_path();

        let Some(merge_with) = merge_strategy_for(effective) else {
            tracing::debug!(path = %path.display(), strategy = %effective, "left untouched");
            return outcome;
        };

        let Some(new_content) = conflict.new_content.as_deref() else {
            return outcome.fail("conflict carries no generated content");
        };
        let existing = conflict.existing_content.as_deref().unwrap_or("");
        let final_content =
            writer::normalize_newlines(&self.merger.merge(existing, new_content, merge_with));

        if conflict.existing_content.is_some() && final_content == existing {
            tracing::debug!(path = %path.display(), strategy = %effective, "content unchanged");
            return outcome;
        }

        let wants_backup = create_backup || effective == ResolutionStrategy::BackupAndReplace;
        if wants_backup && !existing.is_empty() {
            match writer::write_backup(path, existing) {
                Ok(backup) => outcome.backup_path = Some(backup),
                Err(e) => return outcome.fail(format!("backup failed: {e}")),
            }
        }

        if let Err(e) = writer::atomic_write(path, &final_content) {
            tracing::warn!(path = %path.display(), error = %e, "write failed");
            return outcome.fail(e.to_string());
        }
        tracing::info!(path = %path.display(), strategy = %effective, "resolved");
        outcome.written = true;
        outcome.final_content = Some(final_content);
        outcome
    }

    fn size_limit_error(&self, path: &Path, content: &str) -> SyncError {
        SyncError::SizeLimitExceeded {
            path: path.to_path_buf(),
            size: content.len() as u64,
            limit: self.max_file_size,
        }
    }

    /// Write `content` to a target that does not exist yet.
    pub fn write_new(&self, path: &Path, content: &str) -> ResolutionOutcome {
        let outcome = ResolutionOutcome::new(ResolutionStrategy::KeepTheirs, path);
        if content.len() as u64 > self.max_file_size {
            let error = self.size_limit_error(path, content);
            tracing::warn!(error = %error, "not written");
            return ResolutionOutcome {
                strategy_used: ResolutionStrategy::Skip,
                warnings: vec![error.to_string()],
                ..outcome
            };
        }
        match writer::atomic_write(path, content) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "created");
                ResolutionOutcome {
                    written: true,
                    final_content: Some(writer::normalize_newlines(content)),
                    ..outcome
                }
            }
            Err(e) => outcome.fail(e.to_string()),
        }
    }

    fn prompt(&self, conflict: &ConflictRecord, warnings: &mut Vec<String>) -> ResolutionStrategy {
        let choice = self
            .prompter
            .as_ref()
            .and_then(|p| p.choose(conflict))
            .filter(|s| *s != ResolutionStrategy::Prompt);
        match choice {
            Some(strategy) => strategy,
            None => {
                let message = format!(
                    "no interactive choice for {}, falling back to merge_intelligent",
                    conflict.file_path.display()
                );
                tracing::warn!("{message}");
                warnings.push(message);
                ResolutionStrategy::MergeIntelligent
            }
        }
    }

    /// Strategy suggested for `conflict` from its kind and content similarity.
    pub fn recommend(&self, conflict: &ConflictRecord) -> ResolutionStrategy {
        match conflict.kind {
            ConflictKind::PermissionDenied | ConflictKind::SizeLimit => {
                return ResolutionStrategy::Skip
            }
            _ => {}
        }
        if conflict.has_high_severity() {
            return ResolutionStrategy::Prompt;
        }
        let score = match (&conflict.existing_content, &conflict.new_content) {
            (Some(existing), Some(new)) => self.merger.similarity(existing, new),
            _ => 1.0,
        };
        if score > MERGE_RECOMMEND_THRESHOLD {
            ResolutionStrategy::MergeIntelligent
        } else {
            ResolutionStrategy::BackupAndReplace
        }
    }

    /// Resolve every conflict independently; one outcome per input, in order.
    pub fn resolve_many(
        &self,
        conflicts: Vec<ConflictRecord>,
        strategy_map: Option<&BTreeMap<ConflictKind, ResolutionStrategy>>,
        create_backups: bool,
    ) -> Vec<ResolutionOutcome> {
        conflicts
            .into_iter()
            .map(|conflict| {
                let strategy = strategy_map.and_then(|m| m.get(&conflict.kind).copied());
                self.resolve(conflict, strategy, create_backups)
            })
            .collect()
    }

    pub fn summarize(&self, conflicts: &[ConflictRecord]) -> ConflictSummary {
        let mut summary = ConflictSummary {
            total: conflicts.len(),
            ..ConflictSummary::default()
        };
        for conflict in conflicts {
            *summary.by_kind.entry(conflict.kind).or_default() += 1;
            let recommended = self.recommend(conflict);
            *summary.recommended_counts.entry(recommended).or_default() += 1;
            if recommended == ResolutionStrategy::Prompt {
                summary.requires_manual_review_count += 1;
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn missing_target_is_not_a_conflict() {
        let tmp = TempDir::new().unwrap();
        let resolver = ConflictResolver::new(1024);
        assert!(resolver.detect(&tmp.path().join("nope.md"), "x").is_none());
    }

    #[test]
    fn identical_content_is_file_exists() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "# A\nsame\n");
        let c = ConflictResolver::new(1024).detect(&p, "# A\nsame\n").unwrap();
        assert_eq!(c.kind, ConflictKind::FileExists);
        assert!(c.merge_conflicts.is_empty());
    }

    #[rstest]
    #[case("# A\nbody one two three\n", "# A\nbody one two four\n", ConflictKind::ContentModified)]
    #[case("alpha beta gamma\n", "# Z\nomega psi chi\n", ConflictKind::StructuralConflict)]
    #[case("   \n", "# New\n", ConflictKind::FileExists)]
    fn classification(#[case] existing: &str, #[case] new: &str, #[case] kind: ConflictKind) {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", existing);
        assert_eq!(ConflictResolver::new(1024).detect(&p, new).unwrap().kind, kind);
    }

    #[test]
    fn structural_conflict_records_reason() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "alpha beta gamma\n");
        let c = ConflictResolver::new(1024).detect(&p, "# Z\nomega psi chi\n").unwrap();
        assert_eq!(c.kind, ConflictKind::StructuralConflict);
        assert_eq!(c.metadata["reason"], format!("structural conflict in {}", p.display()));
    }

    #[test]
    fn oversized_content_is_size_limit() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "small");
        let c = ConflictResolver::new(4).detect(&p, "too large").unwrap();
        assert_eq!(c.kind, ConflictKind::SizeLimit);
        assert!(c.metadata["reason"].ends_with("generated content is 9 bytes, limit is 4"));
    }

    #[test]
    fn oversized_new_target_is_skipped_with_reason() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("big.md");
        let outcome = ConflictResolver::new(4).write_new(&p, "too large");
        assert!(outcome.success && !outcome.written);
        assert_eq!(outcome.strategy_used, ResolutionStrategy::Skip);
        assert_eq!(
            outcome.warnings,
            vec![format!("{}: generated content is 9 bytes, limit is 4", p.display())]
        );
        assert!(!p.exists());
    }

    #[cfg(unix)]
    #[test]
    fn readonly_target_is_permission_denied() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "locked");
        let mut perms = std::fs::metadata(&p).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&p, perms).unwrap();

        let resolver = ConflictResolver::new(1024);
        let c = resolver.detect(&p, "new").unwrap();
        assert_eq!(c.kind, ConflictKind::PermissionDenied);
        let outcome = resolver.resolve(c, None, true);
        assert_eq!(outcome.strategy_used, ResolutionStrategy::Skip);
        assert!(!outcome.written);
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "locked");
    }

    #[test]
    fn keep_theirs_backs_up_then_overwrites() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "old text\n");
        let resolver = ConflictResolver::new(1024);
        let c = resolver.detect(&p, "new text\n").unwrap();

        let outcome = resolver.resolve(c, Some(ResolutionStrategy::KeepTheirs), true);
        assert!(outcome.success && outcome.written);
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "new text\n");
        let backup = outcome.backup_path.expect("backup");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "old text\n");
        assert_eq!(outcome.final_content.as_deref(), Some("new text\n"));
    }

    #[test]
    fn crlf_content_is_recorded_as_written_and_resolves_once() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "old text\n");
        let resolver = ConflictResolver::new(1024);

        let first = resolver.resolve(
            resolver.detect(&p, "new\r\ntext\r\n").unwrap(),
            Some(ResolutionStrategy::KeepTheirs),
            true,
        );
        assert!(first.written);
        let disk = std::fs::read_to_string(&p).unwrap();
        assert_eq!(disk, "new\ntext\n");
        assert_eq!(first.final_content.as_deref(), Some(disk.as_str()));

        let again = resolver.detect(&p, "new\r\ntext\r\n").unwrap();
        assert_eq!(again.kind, ConflictKind::FileExists);
        let second = resolver.resolve(again, Some(ResolutionStrategy::KeepTheirs), true);
        assert!(second.success && !second.written);
        assert!(second.backup_path.is_none());
        assert_eq!(writer::list_backups(&p).unwrap().len(), 1);
    }

    #[test]
    fn backup_and_replace_always_backs_up() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "old\n");
        let resolver = ConflictResolver::new(1024);
        let c = resolver.detect(&p, "new\n").unwrap();
        let outcome = resolver.resolve(c, Some(ResolutionStrategy::BackupAndReplace), false);
        assert!(outcome.backup_path.is_some());
    }

    #[test]
    fn unchanged_merge_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "# A\nhand edited\n");
        let resolver = ConflictResolver::new(1024);
        let c = resolver.detect(&p, "# A\ngenerated\n").unwrap();
        let outcome = resolver.resolve(c, Some(ResolutionStrategy::MergeIntelligent), true);
        assert!(outcome.success);
        assert!(!outcome.written);
        assert!(outcome.backup_path.is_none());
        assert!(writer::list_backups(&p).unwrap().is_empty());
    }

    #[test]
    fn skip_and_keep_ours_never_write() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "mine\n");
        let resolver = ConflictResolver::new(1024);
        for strategy in [ResolutionStrategy::Skip, ResolutionStrategy::KeepOurs] {
            let c = resolver.detect(&p, "theirs\n").unwrap();
            let outcome = resolver.resolve(c, Some(strategy), true);
            assert!(outcome.success && !outcome.written);
            assert!(outcome.final_content.is_none());
        }
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "mine\n");
    }

    #[test]
    fn resolution_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let resolver = ConflictResolver::new(1024);
        let mut contents = Vec::new();
        for _ in 0..2 {
            let p = file(&tmp, "a.md", "# A\nmine\n");
            let c = resolver.detect(&p, "# A\nx\n\n## B\ny\n").unwrap();
            let outcome = resolver.resolve(c, Some(ResolutionStrategy::MergeIntelligent), false);
            contents.push(outcome.final_content.expect("written"));
        }
        assert_eq!(contents[0], contents[1]);
        assert_eq!(contents[0], "# A\nmine\n\n## B\ny\n");
    }

    #[test]
    fn prompt_without_prompter_falls_back_with_warning() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "# A\n");
        let resolver = ConflictResolver::new(1024);
        let c = resolver.detect(&p, "# A\n\n## B\nnew\n").unwrap();
        let outcome = resolver.resolve(c, Some(ResolutionStrategy::Prompt), false);
        assert_eq!(outcome.strategy_used, ResolutionStrategy::MergeIntelligent);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.written);
    }

    #[test]
    fn write_new_creates_missing_target() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("nested").join("a.md");
        let outcome = ConflictResolver::new(1024).write_new(&p, "# A\n");
        assert!(outcome.success && outcome.written);
        assert_eq!(outcome.strategy_used, ResolutionStrategy::KeepTheirs);
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "# A\n");
    }

    #[test]
    fn write_new_skips_oversized_content() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("a.md");
        let outcome = ConflictResolver::new(2).write_new(&p, "too big");
        assert_eq!(outcome.strategy_used, ResolutionStrategy::Skip);
        assert!(!outcome.written);
        assert!(!p.exists());
    }

    struct AlwaysOurs;

    impl ConflictPrompter for AlwaysOurs {
        fn choose(&self, _conflict: &ConflictRecord) -> Option<ResolutionStrategy> {
            Some(ResolutionStrategy::KeepOurs)
        }
    }

    #[test]
    fn prompt_uses_registered_prompter() {
        let tmp = TempDir::new().unwrap();
        let p = file(&tmp, "a.md", "mine\n");
        let resolver = ConflictResolver::new(1024).with_prompter(Arc::new(AlwaysOurs));
        let c = resolver.detect(&p, "theirs\n").unwrap();
        let outcome = resolver.resolve(c, Some(ResolutionStrategy::Prompt), true);
        assert_eq!(outcome.strategy_used, ResolutionStrategy::KeepOurs);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn resolve_many_applies_map_and_defaults() {
        let tmp = TempDir::new().unwrap();
        let a = file(&tmp, "a.md", "old a\n");
        let b = file(&tmp, "b.md", "old b\n");
        let resolver = ConflictResolver::new(16);
        let mut c1 = resolver.detect(&a, "new a\n").unwrap();
        c1.kind = ConflictKind::FileExists;
        let c2 = resolver.detect(&b, &"x".repeat(64)).unwrap();
        assert_eq!(c2.kind, ConflictKind::SizeLimit);

        let map = BTreeMap::from([(ConflictKind::FileExists, ResolutionStrategy::KeepTheirs)]);
        let outcomes = resolver.resolve_many(vec![c1, c2], Some(&map), true);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].strategy_used, ResolutionStrategy::KeepTheirs);
        assert!(outcomes[0].success && outcomes[0].written);
        assert_eq!(outcomes[1].strategy_used, ResolutionStrategy::Skip);
        assert!(outcomes[1].success && !outcomes[1].written);
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "old b\n");
    }

    #[test]
    fn configured_override_changes_default() {
        let resolver = ConflictResolver::new(1).with_overrides(BTreeMap::from([(
            ConflictKind::SizeLimit,
            ResolutionStrategy::KeepTheirs,
        )]));
        assert_eq!(
            resolver.strategy_for(ConflictKind::SizeLimit),
            ResolutionStrategy::KeepTheirs
        );
        assert_eq!(
            resolver.strategy_for(ConflictKind::ContentModified),
            ResolutionStrategy::MergeIntelligent
        );
    }

    #[test]
    fn summary_counts_kinds_and_reviews() {
        let tmp = TempDir::new().unwrap();
        let resolver = ConflictResolver::new(1024);
        let a = file(&tmp, "a.md", "alpha beta gamma\n");
        let b = file(&tmp, "b.md", "# A\none two three\n");
        let conflicts = vec![
            resolver.detect(&a, "# Z\nomega psi chi\n").unwrap(),
            resolver.detect(&b, "# A\none two three four\n").unwrap(),
        ];
        let summary = resolver.summarize(&conflicts);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_kind[&ConflictKind::StructuralConflict], 1);
        assert_eq!(summary.by_kind[&ConflictKind::ContentModified], 1);
        assert_eq!(summary.requires_manual_review_count, 1);
        assert_eq!(summary.recommended_counts[&ResolutionStrategy::MergeIntelligent], 1);
    }
}
