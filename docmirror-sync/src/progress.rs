//! Progress events emitted while a batch runs.
//!
//! Sinks are observers only: an error returned by a sink is logged and the
//! run continues.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::Serialize;

use docmirror_core::{ConflictKind, ResolutionStrategy};

use crate::state::StageKind;

/// Error type a sink may return.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    BatchStarted {
        total: usize,
    },
    FileStarted {
        path: PathBuf,
        index: usize,
        total: usize,
    },
    StageUpdate {
        path: PathBuf,
        stage: StageKind,
        message: String,
    },
    ConflictDetected {
        path: PathBuf,
        kind: ConflictKind,
        strategy: ResolutionStrategy,
    },
    FileCompleted {
        path: PathBuf,
        index: usize,
        total: usize,
        success: bool,
    },
    BatchCompleted {
        total: usize,
        success_count: usize,
        fail_count: usize,
        duration_ms: u64,
    },
}

/// Receives [`ProgressEvent`]s from a single aggregator thread.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent) -> Result<(), SinkError>;
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self(event)
    }
}

/// Sink that records every event; handy for tests and `--json` output.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }
}

impl ProgressSink for CollectingSink {
    fn on_event(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Deliver `event` to `sink`, logging instead of propagating sink errors.
pub(crate) fn emit(sink: Option<&dyn ProgressSink>, event: ProgressEvent) {
    let Some(sink) = sink else {
        return;
    };
    if let Err(e) = sink.on_event(&event) {
        tracing::warn!(error = %e, ?event, "progress sink failed");
    }
}
