//! Dry-run preview of what a sync would do to each documentation target.
//!
//! Nothing is written: content is generated, existing targets are classified
//! and merged in memory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use docmirror_core::{ConflictKind, ResolutionStrategy};

use crate::error::SyncError;
use crate::merger::MergePreview;
use crate::orchestrator::{RunOptions, WorkflowOrchestrator};
use crate::resolver::merge_strategy_for;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TargetChange {
    /// The target does not exist yet.
    Added { content: String },
    /// The target already matches the generated text.
    Unchanged,
    /// The resolver would leave the target alone.
    Kept {
        conflict: ConflictKind,
        strategy: ResolutionStrategy,
    },
    Modified {
        conflict: ConflictKind,
        strategy: ResolutionStrategy,
        preview: MergePreview,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetPreview {
    pub source: PathBuf,
    pub kind: String,
    pub target: PathBuf,
    #[serde(flatten)]
    pub change: TargetChange,
}

/// Preview every artifact of every path in `paths`.
///
/// Generation errors are returned; the strategy for each conflict is the one
/// a sync with `options` would use.
pub fn preview(
    orchestrator: &WorkflowOrchestrator,
    paths: &[PathBuf],
    options: &RunOptions,
) -> Result<Vec<TargetPreview>, SyncError> {
    let mut previews = Vec::new();
    for path in paths {
        previews.extend(preview_file(orchestrator, path, options)?);
    }
    Ok(previews)
}

fn preview_file(
    orchestrator: &WorkflowOrchestrator,
    source: &Path,
    options: &RunOptions,
) -> Result<Vec<TargetPreview>, SyncError> {
    let layout = orchestrator.layout();
    let resolver = orchestrator.resolver();
    let relative = layout.relative_source(source)?;
    let artifacts = orchestrator.generate(source, &relative, options)?;

    let mut previews = Vec::with_capacity(artifacts.len());
    for (kind, content) in artifacts {
        let target = layout.doc_path(&relative, &kind);
        let change = match resolver.detect(&target, &content) {
            None => TargetChange::Added { content },
            Some(record) if record.existing_content.as_deref() == Some(content.as_str()) => {
                TargetChange::Unchanged
            }
            Some(record) => {
                let conflict = record.kind;
                let strategy = options
                    .strategy_for(conflict)
                    .unwrap_or_else(|| resolver.strategy_for(conflict));
                match merge_strategy_for(strategy) {
                    None => TargetChange::Kept { conflict, strategy },
                    Some(merge) => {
                        let existing = record.existing_content.as_deref().unwrap_or("");
                        TargetChange::Modified {
                            conflict,
                            strategy,
                            preview: resolver.merger().merge_preview(existing, &content, merge),
                        }
                    }
                }
            }
        };
        previews.push(TargetPreview {
            source: source.to_path_buf(),
            kind,
            target,
            change,
        });
    }
    Ok(previews)
}
