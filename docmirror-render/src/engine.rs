//! Tera rendering engine and the default [`ContentGenerator`].
//!
//! # Artifact kinds
//!
//! Every top-level template (a name without `/`) is one artifact. Its kind is
//! the name up to the first `.`:
//!
//! | Template            | Kind      | Mirrored path           |
//! |---------------------|-----------|-------------------------|
//! | `primary.md.tera`   | `primary` | `<docs>/S.md`           |
//! | `history.md.tera`   | `history` | `<docs>/S.history.md`   |
//!
//! Templates under a directory (`shared/_outline.tera`) are partials only. A
//! user template directory may override any embedded template by name or add
//! new top-level templates, which become new artifact kinds.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tera::Tera;

use docmirror_core::{ContentGenerator, GeneratedArtifacts, GenerateError, GenerationRequest};

use crate::context::DocContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates, baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("shared/_outline.tera", include_str!("templates/_partials/outline.tera")),
    ("primary.md.tera", include_str!("templates/primary.md.tera")),
    ("history.md.tera", include_str!("templates/history.md.tera")),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(
            normalize_template_name(Path::new(name)),
            (*content).to_string(),
        );
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

/// Artifact kind for a top-level template name, `None` for partials.
fn artifact_kind(template_name: &str) -> Option<&str> {
    if template_name.contains('/') {
        return None;
    }
    let kind = template_name.split('.').next().unwrap_or(template_name);
    if kind.is_empty() || kind.starts_with('_') {
        None
    } else {
        Some(kind)
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for rendering templates with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files that override embedded defaults.
/// Template names are normalised to lowercase and relative paths.
pub struct TemplateEngine {
    tera: Tera,
    /// kind → template name
    kinds: BTreeMap<String, String>,
}

impl TemplateEngine {
    /// Construct a new [`TemplateEngine`], loading embedded templates plus any
    /// overrides found in `user_template_dir`.
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        let mut kinds = BTreeMap::new();
        for name in tera.get_template_names() {
            if let Some(kind) = artifact_kind(name) {
                kinds.insert(kind.to_string(), name.to_string());
            }
        }
        Ok(TemplateEngine { tera, kinds })
    }

    /// Artifact kinds this engine produces, sorted.
    pub fn artifact_kinds(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// Render a single artifact kind.
    pub fn render(&self, ctx: &DocContext, kind: &str) -> Result<String, RenderError> {
        let name = self
            .kinds
            .get(kind)
            .ok_or_else(|| RenderError::UnknownKind(kind.to_string()))?;
        self.render_template(kind, name, &ctx.to_tera_context()?)
    }

    /// Render every artifact kind for `ctx`.
    pub fn render_all(&self, ctx: &DocContext) -> Result<GeneratedArtifacts, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        let mut out = GeneratedArtifacts::new();
        for (kind, name) in &self.kinds {
            out.insert(kind.clone(), self.render_template(kind, name, &tera_ctx)?);
        }
        Ok(out)
    }

    fn render_template(
        &self,
        kind: &str,
        name: &str,
        tera_ctx: &tera::Context,
    ) -> Result<String, RenderError> {
        let rendered = self
            .tera
            .render(name, tera_ctx)
            .map_err(|source| RenderError::Render {
                kind: kind.to_string(),
                source,
            })?;
        Ok(rendered.replace("\r\n", "\n"))
    }
}

// ---------------------------------------------------------------------------
// TemplateGenerator
// ---------------------------------------------------------------------------

/// [`ContentGenerator`] that renders every artifact template for a source file.
///
/// Create once and share; rendering only reads the compiled templates.
pub struct TemplateGenerator {
    engine: TemplateEngine,
}

impl TemplateGenerator {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(TemplateGenerator {
            engine: TemplateEngine::new(user_template_dir)?,
        })
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }
}

impl ContentGenerator for TemplateGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedArtifacts, GenerateError> {
        let bytes = std::fs::read(&request.source_path).map_err(|e| GenerateError::Source {
            path: request.source_path.clone(),
            source: e,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| GenerateError::Failed {
            path: request.source_path.clone(),
            message: "source is not valid UTF-8".to_string(),
        })?;

        let ctx = DocContext::from_source(
            &request.relative_path,
            &text,
            request.variables.clone(),
            Utc::now(),
        );
        self.engine
            .render_all(&ctx)
            .map_err(|e| GenerateError::Failed {
                path: request.source_path.clone(),
                message: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(path: &str, content: &str) -> DocContext {
        DocContext::from_source(path, content, BTreeMap::new(), Utc::now())
    }

    #[test]
    fn engine_new_succeeds() {
        TemplateEngine::new(None).expect("embedded templates should compile");
    }

    #[test]
    fn embedded_kinds_are_primary_and_history() {
        let engine = TemplateEngine::new(None).unwrap();
        assert_eq!(engine.artifact_kinds(), vec!["history", "primary"]);
    }

    #[test]
    fn artifact_kind_skips_partials() {
        assert_eq!(artifact_kind("primary.md.tera"), Some("primary"));
        assert_eq!(artifact_kind("shared/_outline.tera"), None);
        assert_eq!(artifact_kind("_scratch.tera"), None);
    }

    #[test]
    fn primary_contains_source_and_outline() {
        let engine = TemplateEngine::new(None).unwrap();
        let out = engine
            .render(&ctx("pkg/a.py", "def run():\n    return 1\n"), "primary")
            .unwrap();
        assert!(out.starts_with("# pkg/a.py"));
        assert!(out.contains("## Overview"));
        assert!(out.contains("## Outline"));
        assert!(out.contains("`run` (def, line 1)"));
        assert!(out.contains("```python\ndef run():\n    return 1\n```"));
    }

    #[test]
    fn summary_variable_replaces_placeholder() {
        let engine = TemplateEngine::new(None).unwrap();
        let mut vars = BTreeMap::new();
        vars.insert("summary".to_string(), "Entry point.".to_string());
        let c = DocContext::from_source("main.rs", "fn main() {}\n", vars, Utc::now());
        let out = engine.render(&c, "primary").unwrap();
        assert!(out.contains("Entry point."));
        assert!(!out.contains("No summary yet"));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let engine = TemplateEngine::new(None).unwrap();
        let err = engine.render(&ctx("a.rs", ""), "nope").unwrap_err();
        assert!(matches!(err, RenderError::UnknownKind(ref k) if k == "nope"), "got {err:?}");
    }

    #[test]
    fn no_cr_in_rendered_output() {
        let engine = TemplateEngine::new(None).unwrap();
        let all = engine
            .render_all(&ctx("win.txt", "line one\r\nline two\r\n"))
            .unwrap();
        for (kind, text) in &all {
            assert!(!text.contains('\r'), "{kind} output contains CR");
        }
    }
}
