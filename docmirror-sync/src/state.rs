//! Workflow run state and the store that owns it.
//!
//! A [`WorkflowRun`] moves strictly forward:
//!
//! ```text
//! Pending → Running → Completed | Failed | Cancelled | RolledBack
//! ```
//!
//! Terminal runs are archived into a bounded history and never change again.
//! Each active run sits behind its own mutex; the active map lock is only held
//! to look up, insert or remove handles.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers and enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(Uuid::new_v4())
    }

    /// First eight hex characters, used in tag names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(RunId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Single,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    RolledBack,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::RolledBack
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Init,
    Validate,
    Backup,
    Generate,
    Resolve,
    Commit,
    Cleanup,
    Rollback,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageKind::Init => "init",
            StageKind::Validate => "validate",
            StageKind::Backup => "backup",
            StageKind::Generate => "generate",
            StageKind::Resolve => "resolve",
            StageKind::Commit => "commit",
            StageKind::Cleanup => "cleanup",
            StageKind::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

// ---------------------------------------------------------------------------
// Stage / WorkflowRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub kind: StageKind,
    pub status: StageStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata key holding the restore-point tag name.
pub const META_RESTORE_POINT: &str = "restore_point";
/// Metadata key holding the reason a run failed.
pub const META_FAILURE: &str = "failure";
/// Metadata key holding a failed rollback's error.
pub const META_ROLLBACK_ERROR: &str = "rollback_error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub kind: RunKind,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub stages: Vec<Stage>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl WorkflowRun {
    pub fn new(kind: RunKind) -> Self {
        WorkflowRun {
            id: RunId::new(),
            kind,
            status: RunStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            stages: Vec::new(),
            metadata: BTreeMap::new(),
            cancel_requested: false,
        }
    }

    /// Pending → Running. No effect in any other state.
    pub fn start(&mut self) {
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
        }
    }

    /// Append a running stage and return its index.
    pub fn begin_stage(&mut self, kind: StageKind) -> usize {
        self.stages.push(Stage {
            name: kind.to_string(),
            kind,
            status: StageStatus::Running,
            start_time: Some(Utc::now()),
            end_time: None,
            result: None,
            error: None,
        });
        self.stages.len() - 1
    }

    pub fn complete_stage(&mut self, index: usize, result: Option<serde_json::Value>) {
        if let Some(stage) = self.stages.get_mut(index) {
            stage.status = StageStatus::Completed;
            stage.end_time = Some(Utc::now());
            stage.result = result;
        }
    }

    pub fn fail_stage(&mut self, index: usize, error: impl Into<String>) {
        if let Some(stage) = self.stages.get_mut(index) {
            stage.status = StageStatus::Failed;
            stage.end_time = Some(Utc::now());
            stage.error = Some(error.into());
        }
    }

    /// Move to terminal `status`. Returns false when already terminal.
    pub fn finish(&mut self, status: RunStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
        true
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Restore-point tag recorded by the Backup stage.
    pub fn restore_point(&self) -> Option<&str> {
        self.metadata.get(META_RESTORE_POINT).and_then(|v| v.as_str())
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.stages.last()
    }

    pub fn summary(&self) -> RunSummary {
        let end = self.end_time.unwrap_or_else(Utc::now);
        RunSummary {
            id: self.id,
            kind: self.kind,
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: (end - self.start_time).num_milliseconds().max(0) as u64,
            stage_count: self.stages.len(),
            current_stage: self.current_stage().map(|s| s.kind),
            error: self
                .metadata
                .get(META_FAILURE)
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

/// Compact, serializable view of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: RunId,
    pub kind: RunKind,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub stage_count: usize,
    pub current_stage: Option<StageKind>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// RunStore
// ---------------------------------------------------------------------------

pub type RunHandle = Arc<Mutex<WorkflowRun>>;

/// Owns active runs and a bounded history of finished ones.
#[derive(Debug)]
pub struct RunStore {
    active: RwLock<HashMap<RunId, RunHandle>>,
    history: Mutex<VecDeque<WorkflowRun>>,
    history_limit: usize,
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RunStore {
    pub fn new(history_limit: usize) -> Self {
        RunStore {
            active: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_limit: history_limit.max(1),
        }
    }

    /// Register a new pending run.
    pub fn create(&self, kind: RunKind) -> RunHandle {
        let run = WorkflowRun::new(kind);
        let id = run.id;
        let handle = Arc::new(Mutex::new(run));
        self.active.write().insert(id, Arc::clone(&handle));
        tracing::debug!(run_id = %id, ?kind, "run created");
        handle
    }

    /// Handle of an active run.
    pub fn get(&self, id: &RunId) -> Option<RunHandle> {
        self.active.read().get(id).cloned()
    }

    /// Summary of a run, active or archived.
    pub fn status(&self, id: &RunId) -> Option<RunSummary> {
        if let Some(handle) = self.get(id) {
            return Some(handle.lock().summary());
        }
        self.history
            .lock()
            .iter()
            .find(|r| r.id == *id)
            .map(WorkflowRun::summary)
    }

    pub fn list_active(&self) -> Vec<RunSummary> {
        let handles: Vec<RunHandle> = self.active.read().values().cloned().collect();
        let mut runs: Vec<RunSummary> = handles.iter().map(|h| h.lock().summary()).collect();
        runs.sort_by_key(|r| r.start_time);
        runs
    }

    /// Archived runs, oldest first.
    pub fn history(&self) -> Vec<WorkflowRun> {
        self.history.lock().iter().cloned().collect()
    }

    /// Request cancellation. Only a running run can be cancelled.
    pub fn cancel(&self, id: &RunId) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        let mut run = handle.lock();
        if run.status != RunStatus::Running {
            return false;
        }
        run.cancel_requested = true;
        tracing::info!(run_id = %id, "cancellation requested");
        true
    }

    pub fn is_cancel_requested(&self, id: &RunId) -> bool {
        self.get(id).is_some_and(|h| h.lock().cancel_requested)
    }

    /// Move a terminal run from the active map into history.
    ///
    /// Returns false when the run is unknown or not terminal yet.
    pub fn archive(&self, id: &RunId) -> bool {
        let handle = {
            let mut active = self.active.write();
            let terminal = active
                .get(id)
                .is_some_and(|h| h.lock().status.is_terminal());
            if terminal {
                active.remove(id)
            } else {
                None
            }
        };
        let Some(handle) = handle else {
            return false;
        };
        let snapshot = handle.lock().clone();
        let mut history = self.history.lock();
        history.push_back(snapshot);
        while history.len() > self.history_limit {
            history.pop_front();
        }
        true
    }

    /// Fail and archive active runs older than `max_age`. Returns how many.
    pub fn evict_stale(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let stale: Vec<RunId> = self
            .active
            .read()
            .iter()
            .filter(|(_, h)| h.lock().start_time < cutoff)
            .map(|(id, _)| *id)
            .collect();

        let mut evicted = 0;
        for id in stale {
            if let Some(handle) = self.get(&id) {
                let mut run = handle.lock();
                run.set_meta(
                    META_FAILURE,
                    format!("stale timeout: active longer than {}s", max_age.num_seconds()),
                );
                run.finish(RunStatus::Failed);
            }
            if self.archive(&id) {
                tracing::warn!(run_id = %id, "evicted stale run");
                evicted += 1;
            }
        }
        evicted
    }

    /// Drop archived runs that ended before `now - max_age`.
    pub fn prune_history(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut history = self.history.lock();
        let before = history.len();
        history.retain(|r| r.end_time.map_or(true, |end| end >= cutoff));
        before - history.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn running(store: &RunStore) -> RunId {
        let handle = store.create(RunKind::Single);
        let id = handle.lock().id;
        handle.lock().start();
        id
    }

    #[test]
    fn terminal_status_is_final() {
        let mut run = WorkflowRun::new(RunKind::Single);
        run.start();
        assert!(run.finish(RunStatus::Completed));
        assert!(!run.finish(RunStatus::Failed));
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.end_time.is_some());
    }

    #[test]
    fn finish_rejects_non_terminal_status() {
        let mut run = WorkflowRun::new(RunKind::Batch);
        assert!(!run.finish(RunStatus::Running));
        assert_eq!(run.status, RunStatus::Pending);
    }

    #[test]
    fn stages_are_recorded_in_order() {
        let mut run = WorkflowRun::new(RunKind::Single);
        let v = run.begin_stage(StageKind::Validate);
        run.complete_stage(v, None);
        let g = run.begin_stage(StageKind::Generate);
        run.fail_stage(g, "boom");
        let kinds: Vec<_> = run.stages.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StageKind::Validate, StageKind::Generate]);
        assert_eq!(run.stages[1].status, StageStatus::Failed);
        assert_eq!(run.stages[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn cancel_only_while_running() {
        let store = RunStore::new(10);
        let pending = store.create(RunKind::Single).lock().id;
        assert!(!store.cancel(&pending));

        let id = running(&store);
        assert!(store.cancel(&id));
        assert!(store.is_cancel_requested(&id));
        assert!(!store.cancel(&RunId::new()));
    }

    #[test]
    fn archive_moves_terminal_runs_to_history() {
        let store = RunStore::new(2);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = running(&store);
            assert!(!store.archive(&id), "running runs stay active");
            store.get(&id).unwrap().lock().finish(RunStatus::Completed);
            assert!(store.archive(&id));
            ids.push(id);
        }
        assert!(store.list_active().is_empty());
        let history = store.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, ids[1]);
        assert_eq!(store.status(&ids[2]).unwrap().status, RunStatus::Completed);
        assert!(store.status(&ids[0]).is_none());
    }

    #[test]
    fn status_summarises_an_active_run() {
        let store = RunStore::new(10);
        let id = running(&store);
        store.get(&id).unwrap().lock().begin_stage(StageKind::Validate);
        store.get(&id).unwrap().lock().begin_stage(StageKind::Generate);

        let summary = store.status(&id).unwrap();
        assert_eq!(summary.status, RunStatus::Running);
        assert_eq!(summary.stage_count, 2);
        assert_eq!(summary.current_stage, Some(StageKind::Generate));
        assert!(summary.end_time.is_none() && summary.error.is_none());
        assert_eq!(store.list_active()[0].id, summary.id);
    }

    #[test]
    fn stale_runs_are_failed_and_archived() {
        let store = RunStore::new(10);
        let id = running(&store);
        store.get(&id).unwrap().lock().start_time = Utc::now() - Duration::hours(2);
        let fresh = running(&store);

        assert_eq!(store.evict_stale(Duration::hours(1)), 1);
        let run = store.status(&id).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("stale"));
        assert_eq!(store.list_active().len(), 1);
        assert_eq!(store.list_active()[0].id, fresh);
    }

    #[test]
    fn prune_history_drops_old_runs() {
        let store = RunStore::new(10);
        let id = running(&store);
        {
            let handle = store.get(&id).unwrap();
            let mut run = handle.lock();
            run.finish(RunStatus::Completed);
            run.end_time = Some(Utc::now() - Duration::days(3));
        }
        store.archive(&id);
        assert_eq!(store.prune_history(Duration::days(1)), 1);
        assert!(store.history().is_empty());
    }

    #[test]
    fn run_id_short_is_eight_chars() {
        let id = RunId::new();
        assert_eq!(id.short().len(), 8);
        assert_eq!(id.to_string().parse::<RunId>().unwrap(), id);
    }
}
