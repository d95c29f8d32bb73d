//! Run summary produced by the aggregator.
//!
//! The summary is derived data: it can be rebuilt from a run's envelopes at
//! any time, so nothing here is authoritative.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema version written into every summary.
pub const SUMMARY_SCHEMA_VERSION: &str = "1.0.0";

/// Aggregated report over one run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub run_id: String,
    pub branch: Option<String>,
    pub plan_ref: Option<String>,
    pub prd_ref: Option<String>,

    /// Earliest envelope timestamp (ISO 8601, UTC)
    pub started_at: Option<String>,
    /// Latest envelope timestamp (ISO 8601, UTC)
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,

    pub tasks: TaskCounts,
    pub tests: TestTotals,
    pub costs: CostTotals,
    pub files: FileTotals,
}

/// Envelope counts per status bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,
    pub in_progress: usize,
    pub other: usize,
    /// Small per-task index for quick inspection
    pub index: Vec<TaskIndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIndexEntry {
    pub task_id: Option<Value>,
    pub status: Option<Value>,
    pub message: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestTotals {
    pub runs: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub usd_estimate: f64,
    pub tool_calls: u64,
    pub by_model: BTreeMap<String, ModelCosts>,
}

/// Cost sums for the envelopes reporting one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCosts {
    pub count: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub usd_estimate: f64,
    pub tool_calls: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileTotals {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub renamed: usize,
    pub created_paths: Vec<String>,
    pub updated_paths: Vec<String>,
    pub deleted_paths: Vec<String>,
    pub renamed_paths: Vec<RenameEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEvent {
    pub from: Option<String>,
    pub to: String,
}
