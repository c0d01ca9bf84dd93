use std::fmt;

use serde::Serialize;
use tracecheck_core::GlobalState;

/// Terminal (or not yet terminal) result of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Running,
    Successful,
    /// Only reached when a condition raised an error.
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a branch that is still matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningState {
    /// Creation-order id, stable for the branch's lifetime.
    pub id: u64,
    /// Readable rendering of where in the tree the branch waits.
    pub position: String,
    pub state: GlobalState,
}

/// A branch that reached a terminal outcome. Its state is frozen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishState {
    pub id: u64,
    pub outcome: Outcome,
    pub state: GlobalState,
    /// Position at which the branch finished.
    pub position: String,
    /// Error text for [`Outcome::Failed`].
    pub error: Option<String>,
}

impl FinishState {
    pub fn is_successful(&self) -> bool {
        self.outcome == Outcome::Successful
    }
}

/// Counters reported by [`ValidatorPath::stats`](crate::ValidatorPath::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PathStats {
    pub events_applied: u64,
    pub branches_spawned: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Serializable snapshot of a whole path, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PathReport {
    pub id: u64,
    pub name: Option<String>,
    pub tree: String,
    pub stats: PathStats,
    pub running: Vec<RunningState>,
    pub finished: Vec<FinishState>,
}
