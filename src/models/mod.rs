//! Data models for backlog entities.
//!
//! This module defines the core data structures:
//! - `Task` - Work items with status, priority, dependencies and opaque payload
//! - `TaskStatus` - The fixed lifecycle a task moves through
//! - `Priority` - Scheduling rank (`P0` highest)
//! - `RunEnvelope` - Per-task result record produced by an executor (see [`envelope`])
//! - `RunSummary` - Aggregated report over one run (see [`summary`])

pub mod envelope;
pub mod summary;

pub use envelope::{FileChange, FileOp, RunEnvelope};
pub use summary::{
    CostTotals, FileTotals, ModelCosts, RenameEvent, RunSummary, TaskCounts, TaskIndexEntry,
    TestTotals,
};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Task status in the workflow.
///
/// Serialized with the variant name (`"InProgress"`), which is also the
/// form stored in the task file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Planned,
    InProgress,
    Review,
    Done,
    Blocked,
}

impl TaskStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Planned,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
        TaskStatus::Blocked,
    ];

    /// Canonical (stored) name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Planned => "Planned",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Review => "Review",
            TaskStatus::Done => "Done",
            TaskStatus::Blocked => "Blocked",
        }
    }

    /// Match a stored status value exactly.
    pub fn from_stored(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Parse user input, case-insensitive, accepting `in_progress` style spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "planned" => Some(TaskStatus::Planned),
            "inprogress" | "in_progress" | "in-progress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "done" => Some(TaskStatus::Done),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }

    /// Statuses reachable from this one in a single transition.
    pub fn allowed_targets(&self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Planned => &[TaskStatus::InProgress, TaskStatus::Blocked],
            TaskStatus::InProgress => &[TaskStatus::Review, TaskStatus::Blocked],
            TaskStatus::Review => &[TaskStatus::Done, TaskStatus::InProgress],
            TaskStatus::Blocked => &[TaskStatus::InProgress],
            TaskStatus::Done => &[],
        }
    }

    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        self.allowed_targets().contains(&to)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority. Lower rank runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    /// Rank used for tasks with a missing or unrecognised priority.
    pub const UNKNOWN_RANK: u8 = 99;

    pub fn from_stored(s: &str) -> Option<Self> {
        match s {
            "P0" => Some(Priority::P0),
            "P1" => Some(Priority::P1),
            "P2" => Some(Priority::P2),
            "P3" => Some(Priority::P3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

/// A work item in the task store.
///
/// The task is kept as the raw JSON object so that fields this crate does not
/// know about survive every load/save cycle with their values and order intact.
/// Recognised fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task {
    fields: Map<String, Value>,
}

impl Task {
    /// Create a new task with the given ID and status.
    pub fn new(id: impl Into<String>, status: TaskStatus) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.into()));
        fields.insert("status".to_string(), Value::String(status.to_string()));
        Self { fields }
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::InvalidInput(format!(
                "task must be a JSON object, got: {}",
                other
            ))),
        }
    }

    /// Task id, when present as a non-empty string.
    pub fn id(&self) -> Option<&str> {
        self.fields
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Raw stored status string, which may be outside the known set.
    pub fn status_str(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// Known status, or `None` when missing or unrecognised.
    pub fn status(&self) -> Option<TaskStatus> {
        self.status_str().and_then(TaskStatus::from_stored)
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.fields
            .insert("status".to_string(), Value::String(status.to_string()));
    }

    pub fn priority(&self) -> Option<Priority> {
        self.fields
            .get("priority")
            .and_then(Value::as_str)
            .and_then(Priority::from_stored)
    }

    /// Priority rank for scheduling; unknown priorities sort last.
    pub fn priority_rank(&self) -> u8 {
        self.priority()
            .map(|p| p.rank())
            .unwrap_or(Priority::UNKNOWN_RANK)
    }

    /// Raw `deps` entries. A missing or non-array field means no dependencies.
    pub fn deps(&self) -> &[Value] {
        match self.fields.get("deps") {
            Some(Value::Array(deps)) => deps,
            _ => &[],
        }
    }

    /// Builder-style dependency setter, mostly for tests and fixtures.
    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let deps = deps.into_iter().map(|d| Value::String(d.into())).collect();
        self.fields.insert("deps".to_string(), Value::Array(deps));
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.fields.insert(
            "priority".to_string(),
            Value::String(priority.as_str().to_string()),
        );
        self
    }

    /// Shallow merge: every field of `incoming` overwrites the same field here,
    /// fields only present here are kept. Existing fields keep their position.
    pub fn merge_from(&mut self, incoming: Task) {
        for (key, value) in incoming.fields {
            self.fields.insert(key, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
