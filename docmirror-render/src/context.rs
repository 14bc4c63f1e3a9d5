//! Serializable rendering payload built from one source file.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Rendering payload for a single source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocContext {
    pub source: SourceCtx,
    pub stats: StatsCtx,
    /// Top-level definitions found by a line-prefix scan.
    pub outline: Vec<OutlineItem>,
    /// Source text, line endings normalised to LF, trailing newline trimmed.
    pub content: String,
    /// Backtick fence long enough to wrap `content` safely.
    pub fence: String,
    pub meta: MetaCtx,
    /// Caller-supplied variables (e.g. `summary`).
    pub variables: BTreeMap<String, String>,
}

/// Identity of the documented file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCtx {
    pub relative_path: String,
    pub file_name: String,
    pub extension: String,
    pub language: String,
    /// Info string used on the code fence (empty when unknown).
    pub fence_lang: String,
}

/// Size statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsCtx {
    pub line_count: usize,
    pub byte_count: usize,
    pub blank_lines: usize,
}

/// One outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineItem {
    pub kind: String,
    pub name: String,
    /// 1-based line number.
    pub line: usize,
}

/// Generation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub docmirror_version: String,
    pub generated_at: String,
}

/// `(prefix, kind)` pairs recognised at the start of an unindented line.
const OUTLINE_PREFIXES: &[(&str, &str)] = &[
    ("pub fn ", "fn"),
    ("fn ", "fn"),
    ("pub struct ", "struct"),
    ("struct ", "struct"),
    ("pub enum ", "enum"),
    ("enum ", "enum"),
    ("pub trait ", "trait"),
    ("trait ", "trait"),
    ("def ", "def"),
    ("async def ", "def"),
    ("class ", "class"),
    ("export function ", "function"),
    ("function ", "function"),
    ("export class ", "class"),
    ("func ", "func"),
    ("type ", "type"),
];

impl DocContext {
    /// Build a [`DocContext`] for `relative_path` with the file's text.
    pub fn from_source(
        relative_path: &str,
        content: &str,
        variables: BTreeMap<String, String>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let normalized = content.replace("\r\n", "\n");
        let path = Path::new(relative_path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative_path.to_string());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let (language, fence_lang) = language_for(&extension);

        let line_count = normalized.lines().count();
        let blank_lines = normalized.lines().filter(|l| l.trim().is_empty()).count();

        DocContext {
            source: SourceCtx {
                relative_path: relative_path.to_string(),
                file_name,
                extension,
                language: language.to_string(),
                fence_lang: fence_lang.to_string(),
            },
            stats: StatsCtx {
                line_count,
                byte_count: normalized.len(),
                blank_lines,
            },
            outline: outline(&normalized),
            fence: fence_for(&normalized),
            content: normalized.trim_end_matches('\n').to_string(),
            meta: MetaCtx {
                docmirror_version: env!("CARGO_PKG_VERSION").to_string(),
                generated_at: generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            },
            variables,
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(|source| RenderError::Context { source })
    }
}

fn language_for(extension: &str) -> (&'static str, &'static str) {
    match extension {
        "rs" => ("Rust", "rust"),
        "py" => ("Python", "python"),
        "js" | "mjs" | "cjs" => ("JavaScript", "javascript"),
        "ts" | "tsx" => ("TypeScript", "typescript"),
        "go" => ("Go", "go"),
        "java" => ("Java", "java"),
        "rb" => ("Ruby", "ruby"),
        "c" | "h" => ("C", "c"),
        "cc" | "cpp" | "hpp" => ("C++", "cpp"),
        "sh" | "bash" => ("Shell", "sh"),
        "toml" => ("TOML", "toml"),
        "yaml" | "yml" => ("YAML", "yaml"),
        "json" => ("JSON", "json"),
        "md" => ("Markdown", "markdown"),
        _ => ("text", ""),
    }
}

fn outline(content: &str) -> Vec<OutlineItem> {
    let mut items = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for (prefix, kind) in OUTLINE_PREFIXES {
            let Some(rest) = line.strip_prefix(prefix) else {
                continue;
            };
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                items.push(OutlineItem {
                    kind: (*kind).to_string(),
                    name,
                    line: idx + 1,
                });
            }
            break;
        }
    }
    items
}

fn fence_for(content: &str) -> String {
    let mut longest = 0usize;
    let mut run = 0usize;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat(longest.max(2) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(path: &str, content: &str) -> DocContext {
        DocContext::from_source(path, content, BTreeMap::new(), Utc::now())
    }

    #[test]
    fn context_fields_populated() {
        let c = ctx("pkg/util.py", "import os\n\ndef load(path):\n    pass\n\nclass Store:\n    pass\n");
        assert_eq!(c.source.file_name, "util.py");
        assert_eq!(c.source.language, "Python");
        assert_eq!(c.stats.line_count, 7);
        assert_eq!(c.stats.blank_lines, 2);
        assert_eq!(
            c.outline,
            vec![
                OutlineItem { kind: "def".into(), name: "load".into(), line: 3 },
                OutlineItem { kind: "class".into(), name: "Store".into(), line: 6 },
            ]
        );
    }

    #[test]
    fn indented_definitions_are_not_outlined() {
        let c = ctx("a.rs", "impl X {\n    fn inner() {}\n}\npub fn outer() {}\n");
        assert_eq!(c.outline.len(), 1);
        assert_eq!(c.outline[0].name, "outer");
    }

    #[test]
    fn fence_outgrows_backtick_runs_in_content() {
        assert_eq!(ctx("a.md", "plain").fence, "```");
        assert_eq!(ctx("a.md", "```rust\nx\n```").fence, "````");
    }

    #[test]
    fn crlf_is_normalised() {
        let c = ctx("a.txt", "one\r\ntwo\r\n");
        assert_eq!(c.content, "one\ntwo");
        assert_eq!(c.source.fence_lang, "");
    }

    #[test]
    fn to_tera_context_succeeds() {
        let c = ctx("lib.rs", "pub fn a() {}\n");
        c.to_tera_context().expect("context conversion");
    }
}
