//! Line-based structural merge of markdown-like documentation.
//!
//! Sections are found by ATX headings (`#` … `######`) outside fenced code
//! blocks. All spans are half-open line ranges into the scanned text.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use docmirror_core::Severity;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$").expect("heading regex is valid")
});

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{0,3}(`{3,}|~{3,})\s*([\w+#.-]*)").expect("fence regex is valid")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word regex is valid"));

/// Length of [`MergePreview::preview_snippet`] in characters.
pub const PREVIEW_CHARS: usize = 500;

/// Similarity below this is a divergence conflict.
pub const DIVERGENCE_THRESHOLD: f64 = 0.5;

/// Similarity below this makes a divergence high severity.
pub const HIGH_DIVERGENCE_THRESHOLD: f64 = 0.3;

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub title: String,
    /// Heading line through the line before the next heading.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub lang: Option<String>,
    /// Opening fence through closing fence (or end of text when unclosed).
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub headings: Vec<Heading>,
    pub code_blocks: Vec<CodeBlock>,
    pub paragraphs: Vec<Range<usize>>,
}

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Scan `text` for headings, fenced code blocks and paragraphs.
pub fn detect_sections(text: &str) -> Sections {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Sections::default();
    let mut open_fence: Option<(char, usize, usize, Option<String>)> = None;
    let mut paragraph_start: Option<usize> = None;

    let close_paragraph = |start: &mut Option<usize>, end: usize, out: &mut Vec<Range<usize>>| {
        if let Some(s) = start.take() {
            out.push(s..end);
        }
    };

    for (idx, line) in lines.iter().enumerate() {
        if let Some((ch, len, start, lang)) = open_fence.take() {
            let trimmed = line.trim();
            let closes = trimmed.len() >= len
                && trimmed.chars().all(|c| c == ch)
                && !trimmed.is_empty();
            if closes {
                sections.code_blocks.push(CodeBlock {
                    lang,
                    span: start..idx + 1,
                });
            } else {
                open_fence = Some((ch, len, start, lang));
            }
            continue;
        }

        if let Some(caps) = FENCE_RE.captures(line) {
            close_paragraph(&mut paragraph_start, idx, &mut sections.paragraphs);
            let fence = &caps[1];
            let ch = fence.chars().next().unwrap_or('`');
            let lang = caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            open_fence = Some((ch, fence.len(), idx, lang));
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            close_paragraph(&mut paragraph_start, idx, &mut sections.paragraphs);
            sections.headings.push(Heading {
                level: caps[1].len() as u8,
                title: caps[2].trim().to_string(),
                span: idx..idx + 1,
            });
            continue;
        }

        if line.trim().is_empty() {
            close_paragraph(&mut paragraph_start, idx, &mut sections.paragraphs);
        } else if paragraph_start.is_none() {
            paragraph_start = Some(idx);
        }
    }

    close_paragraph(&mut paragraph_start, lines.len(), &mut sections.paragraphs);
    if let Some((_, _, start, lang)) = open_fence {
        sections.code_blocks.push(CodeBlock {
            lang,
            span: start..lines.len(),
        });
    }

    let starts: Vec<usize> = sections.headings.iter().map(|h| h.span.start).collect();
    for (i, heading) in sections.headings.iter_mut().enumerate() {
        heading.span.end = starts.get(i + 1).copied().unwrap_or(lines.len());
    }
    sections
}

/// Jaccard similarity of the lower-cased `\w+` token sets.
///
/// Returns 1.0 when either side has no tokens.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 1.0;
    }
    let inter = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    inter as f64 / union as f64
}

fn tokens(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeConflictKind {
    /// Same heading title at a different level.
    HeadingLevel,
    /// Overall content similarity below the divergence threshold.
    Divergence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub kind: MergeConflictKind,
    pub severity: Severity,
    pub description: String,
}

/// Find structural disagreements between `base` and `new`.
pub fn detect_conflicts(base: &str, new: &str) -> Vec<MergeConflict> {
    let mut conflicts = Vec::new();
    let base_sections = detect_sections(base);
    let new_sections = detect_sections(new);

    for nh in &new_sections.headings {
        let title = normalize_title(&nh.title);
        let clash = base_sections
            .headings
            .iter()
            .find(|bh| normalize_title(&bh.title) == title && bh.level != nh.level);
        if let Some(bh) = clash {
            conflicts.push(MergeConflict {
                kind: MergeConflictKind::HeadingLevel,
                severity: Severity::Medium,
                description: format!(
                    "heading '{}' is level {} in existing content and level {} in new content",
                    nh.title, bh.level, nh.level
                ),
            });
        }
    }

    let score = similarity(base, new);
    if score < DIVERGENCE_THRESHOLD {
        let severity = if score < HIGH_DIVERGENCE_THRESHOLD {
            Severity::High
        } else {
            Severity::Medium
        };
        conflicts.push(MergeConflict {
            kind: MergeConflictKind::Divergence,
            severity,
            description: format!("content similarity {score:.2} is below {DIVERGENCE_THRESHOLD}"),
        });
    }
    conflicts
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Replace,
    Append,
    Prepend,
    Intelligent,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Replace => write!(f, "replace"),
            MergeStrategy::Append => write!(f, "append"),
            MergeStrategy::Prepend => write!(f, "prepend"),
            MergeStrategy::Intelligent => write!(f, "intelligent"),
        }
    }
}

/// Combine existing `base` with generated `new`.
pub fn merge(base: &str, new: &str, strategy: MergeStrategy) -> String {
    match strategy {
        MergeStrategy::Replace => new.to_string(),
        MergeStrategy::Append => join_blocks(base, new),
        MergeStrategy::Prepend => join_blocks(new, base),
        MergeStrategy::Intelligent => merge_intelligent(base, new),
    }
}

fn join_blocks(first: &str, second: &str) -> String {
    if first.trim().is_empty() {
        return second.to_string();
    }
    if second.trim().is_empty() {
        return first.to_string();
    }
    format!("{}\n\n{}", first.trim_end_matches('\n'), second)
}

fn merge_intelligent(base: &str, new: &str) -> String {
    if base.trim().is_empty() {
        return new.to_string();
    }
    if base == new {
        return base.to_string();
    }

    let mut known: HashSet<String> = detect_sections(base)
        .headings
        .iter()
        .map(|h| normalize_title(&h.title))
        .collect();

    let new_lines: Vec<&str> = new.lines().collect();
    let mut missing = Vec::new();
    for heading in detect_sections(new).headings {
        if !known.insert(normalize_title(&heading.title)) {
            continue;
        }
        let body = new_lines[heading.span.clone()].join("\n");
        missing.push(body.trim_end().to_string());
    }
    if missing.is_empty() {
        return base.to_string();
    }

    let mut merged = base.trim_end().to_string();
    for section in missing {
        merged.push_str("\n\n");
        merged.push_str(&section);
    }
    if base.ends_with('\n') {
        merged.push('\n');
    }
    merged
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// What a merge would do, without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergePreview {
    pub conflicts: Vec<MergeConflict>,
    pub similarity: f64,
    pub merged_length: usize,
    pub preview_snippet: String,
    /// Unified diff of `base` against the merged text.
    pub unified_diff: String,
    /// Set when the merge itself failed; the other fields are then empty.
    pub error: Option<String>,
}

/// Stateless facade over the merge functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentMerger;

impl ContentMerger {
    pub fn detect_sections(&self, text: &str) -> Sections {
        detect_sections(text)
    }

    pub fn detect_conflicts(&self, base: &str, new: &str) -> Vec<MergeConflict> {
        detect_conflicts(base, new)
    }

    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        similarity(a, b)
    }

    pub fn merge(&self, base: &str, new: &str, strategy: MergeStrategy) -> String {
        merge(base, new, strategy)
    }

    /// Never panics: a panic inside the merge is reported in `error`.
    pub fn merge_preview(&self, base: &str, new: &str, strategy: MergeStrategy) -> MergePreview {
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            let merged = merge(base, new, strategy);
            let unified_diff = TextDiff::from_lines(base, merged.as_str())
                .unified_diff()
                .header("existing", "merged")
                .context_radius(3)
                .to_string();
            MergePreview {
                conflicts: detect_conflicts(base, new),
                similarity: similarity(base, new),
                merged_length: merged.len(),
                preview_snippet: merged.chars().take(PREVIEW_CHARS).collect(),
                unified_diff,
                error: None,
            }
        }));
        attempt.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "merge panicked".to_string());
            tracing::error!(%strategy, error = %message, "merge preview failed");
            MergePreview {
                error: Some(message),
                ..MergePreview::default()
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
