use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A database the engine runs procedures against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseTarget {
    /// Unique key shared by both configuration sources.
    pub name: String,
    /// Opaque to the engine; interpreted by the execution gateway.
    pub descriptor: serde_json::Value,
}

/// An ordered list of procedures sharing one re-trigger timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureGroup {
    pub key: String,
    /// Execution order.
    pub procedures: Vec<String>,
    /// Delay between the end of one pass and the start of the next.
    pub timeout: Duration,
    /// Pause after each procedure; `None` uses the engine default.
    pub pause: Option<Duration>,
}

/// Identifies which `start()` call a lineage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters for one pass over a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Procedures invoked, successful or not.
    pub executed: usize,
    /// Procedures whose invocation returned an error.
    pub failed: usize,
}

/// How a pass that reached the runner ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    /// Cancellation was observed before the pass began. The lineage ends.
    Skipped,
    /// Every procedure was attempted.
    Completed(PassReport),
    /// Cancellation was observed part-way; attempted procedures stand.
    Cancelled(PassReport),
}

impl GroupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            GroupOutcome::Skipped => "skipped",
            GroupOutcome::Completed(r) if r.failed > 0 => "completed_with_errors",
            GroupOutcome::Completed(_) => "completed",
            GroupOutcome::Cancelled(_) => "partially_cancelled",
        }
    }
}

/// Position of a lineage in its run / wait cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageState {
    Idle,
    Running,
    WaitingForTimeout,
    Stopped,
}

impl fmt::Display for LineageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineageState::Idle => "idle",
            LineageState::Running => "running",
            LineageState::WaitingForTimeout => "waiting_for_timeout",
            LineageState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Read-only view of one lineage, for observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageSnapshot {
    pub database: String,
    pub group: String,
    pub generation: Generation,
    pub state: LineageState,
    /// Completed passes. Skipped passes and the one in flight are not counted.
    pub passes: u64,
    pub last_outcome: Option<String>,
}
