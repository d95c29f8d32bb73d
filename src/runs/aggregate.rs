//! Fold a run's envelopes into a single [`RunSummary`].
//!
//! Envelope parsing is best-effort: a file that cannot be read or is not a
//! JSON object is left out of the summary without failing the run. This is
//! the opposite of the task store, which refuses to load a malformed line.

use super::{DEFAULT_PATH_SAMPLE_LIMIT, DEFAULT_SUMMARY_FILE, envelope_files};
use crate::Result;
use crate::models::summary::SUMMARY_SCHEMA_VERSION;
use crate::models::{
    CostTotals, FileOp, FileTotals, ModelCosts, RenameEvent, RunEnvelope, RunSummary, TaskCounts,
    TaskIndexEntry, TestTotals,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Knobs for aggregation.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Summary filename, never read back as an envelope
    pub summary_file: String,
    /// Cap on each sample path list
    pub path_sample_limit: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            summary_file: DEFAULT_SUMMARY_FILE.to_string(),
            path_sample_limit: DEFAULT_PATH_SAMPLE_LIMIT,
        }
    }
}

/// Outcome of aggregating one run directory.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Summary(Box<RunSummary>),
    /// The directory holds no parsable envelope.
    NoEnvelopes,
}

/// Aggregate every envelope in `run_dir`.
pub fn aggregate_run(run_dir: &Path, options: &AggregateOptions) -> Result<Aggregation> {
    let files = envelope_files(run_dir, &options.summary_file)?;
    let envelopes: Vec<RunEnvelope> = files.iter().filter_map(|f| read_envelope(f)).collect();

    tracing::debug!(
        run_dir = %run_dir.display(),
        files = files.len(),
        parsed = envelopes.len(),
        "read run envelopes"
    );

    if envelopes.is_empty() {
        return Ok(Aggregation::NoEnvelopes);
    }
    Ok(Aggregation::Summary(Box::new(summarize(
        run_dir, &envelopes, options,
    ))))
}

fn read_envelope(path: &Path) -> Option<RunEnvelope> {
    let parsed = fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .and_then(RunEnvelope::from_value);
    if parsed.is_none() {
        tracing::debug!(path = %path.display(), "skipping unparsable envelope");
    }
    parsed
}

/// Build the summary for `envelopes` found in `run_dir`.
pub fn summarize(run_dir: &Path, envelopes: &[RunEnvelope], options: &AggregateOptions) -> RunSummary {
    let mut tasks = TaskCounts {
        total: envelopes.len(),
        ..TaskCounts::default()
    };
    let mut tests = TestTotals::default();
    let mut costs = CostAccumulator::default();
    let mut files = FileAccumulator::default();
    let mut timestamps: Vec<DateTime<Utc>> = Vec::new();

    let mut run_id: Option<String> = None;
    let mut plan_ref: Option<String> = None;
    let mut branch: Option<String> = None;

    for env in envelopes {
        match env.status_key().as_str() {
            "completed" => tasks.completed += 1,
            "failed" => tasks.failed += 1,
            "blocked" => tasks.blocked += 1,
            "skipped" => tasks.skipped += 1,
            "in_progress" => tasks.in_progress += 1,
            _ => tasks.other += 1,
        }

        tasks.index.push(TaskIndexEntry {
            task_id: env.task_id().cloned(),
            status: env.status().cloned(),
            message: env.commit_message().cloned(),
        });

        if env.tests().is_some() {
            tests.runs += 1;
            if env.tests_passed() == Some(true) {
                tests.passed += 1;
            }
        }

        if env.costs().is_some() {
            costs.add(env);
        }

        for change in env.files() {
            match change.op {
                FileOp::Create => files.created.push(change.path),
                FileOp::Update => files.updated.push(change.path),
                FileOp::Delete => files.deleted.push(change.path),
                FileOp::Rename => files.renamed.push(RenameEvent {
                    from: change.prev_path,
                    to: change.path,
                }),
            }
        }

        if let Some(ts) = env.created_at().and_then(parse_timestamp) {
            timestamps.push(ts);
        }

        if run_id.is_none() {
            run_id = env.run_id();
        }
        if plan_ref.is_none() {
            plan_ref = env.plan_ref().map(str::to_string);
        }
        if branch.is_none() {
            branch = env.commit_branch().map(str::to_string);
        }
    }

    tests.failed = tests.runs - tests.passed;
    tests.pass_rate = (tests.runs > 0).then(|| round_to(tests.passed as f64 / tests.runs as f64, 3));

    let started = timestamps.iter().min().copied();
    let finished = timestamps.iter().max().copied();
    let duration_ms = match (started, finished) {
        (Some(s), Some(f)) => Some((f - s).num_milliseconds()),
        _ => None,
    };

    let prd_ref = plan_ref
        .as_deref()
        .and_then(|plan| resolve_prd_ref(run_dir, plan));

    RunSummary {
        schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
        run_id: run_id.unwrap_or_else(|| dir_name(run_dir)),
        branch,
        plan_ref,
        prd_ref,
        started_at: started.map(format_timestamp),
        finished_at: finished.map(format_timestamp),
        duration_ms,
        tasks,
        tests,
        costs: costs.finish(),
        files: files.finish(options.path_sample_limit),
    }
}

#[derive(Default)]
struct CostAccumulator {
    input_tokens: f64,
    output_tokens: f64,
    usd_estimate: f64,
    tool_calls: f64,
    // first-seen order; BTreeMap output sorts anyway
    by_model: Vec<(String, ModelSums)>,
}

#[derive(Default, Clone, Copy)]
struct ModelSums {
    count: usize,
    input_tokens: f64,
    output_tokens: f64,
    usd_estimate: f64,
    tool_calls: f64,
}

impl CostAccumulator {
    fn add(&mut self, env: &RunEnvelope) {
        let input = env.cost_number("input_tokens");
        let output = env.cost_number("output_tokens");
        let usd = env.cost_number("usd_estimate");
        let calls = env.cost_number("tool_calls");

        self.input_tokens += input;
        self.output_tokens += output;
        self.usd_estimate += usd;
        self.tool_calls += calls;

        if let Some(model) = env.cost_model() {
            let idx = match self.by_model.iter().position(|(m, _)| m == model) {
                Some(idx) => idx,
                None => {
                    self.by_model.push((model.to_string(), ModelSums::default()));
                    self.by_model.len() - 1
                }
            };
            let sums = &mut self.by_model[idx].1;
            sums.count += 1;
            sums.input_tokens += input;
            sums.output_tokens += output;
            sums.usd_estimate += usd;
            sums.tool_calls += calls;
        }
    }

    fn finish(self) -> CostTotals {
        CostTotals {
            input_tokens: to_count(self.input_tokens),
            output_tokens: to_count(self.output_tokens),
            usd_estimate: round_to(self.usd_estimate, 6),
            tool_calls: to_count(self.tool_calls),
            by_model: self
                .by_model
                .into_iter()
                .map(|(model, s)| {
                    (
                        model,
                        ModelCosts {
                            count: s.count,
                            input_tokens: to_count(s.input_tokens),
                            output_tokens: to_count(s.output_tokens),
                            usd_estimate: round_to(s.usd_estimate, 6),
                            tool_calls: to_count(s.tool_calls),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Default)]
struct FileAccumulator {
    created: Vec<String>,
    updated: Vec<String>,
    deleted: Vec<String>,
    renamed: Vec<RenameEvent>,
}

impl FileAccumulator {
    fn finish(self, limit: usize) -> FileTotals {
        let created = dedup(self.created);
        let updated = dedup(self.updated);
        let deleted = dedup(self.deleted);
        FileTotals {
            created: created.len(),
            updated: updated.len(),
            deleted: deleted.len(),
            renamed: self.renamed.len(),
            created_paths: created.into_iter().take(limit).collect(),
            updated_paths: updated.into_iter().take(limit).collect(),
            deleted_paths: deleted.into_iter().take(limit).collect(),
            renamed_paths: self.renamed.into_iter().take(limit).collect(),
        }
    }
}

/// Drop repeated paths, keeping first-seen order.
fn dedup(paths: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn to_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Parse an envelope timestamp: RFC 3339, or a naive date-time / date taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Look up `prd_ref` in the plan file named by `plan_ref`, when it is a local
/// JSON file (as given, or relative to the run directory).
fn resolve_prd_ref(run_dir: &Path, plan_ref: &str) -> Option<String> {
    let candidates = [PathBuf::from(plan_ref), run_dir.join(plan_ref)];
    let plan_path = candidates.iter().find(|p| p.is_file())?;
    let text = fs::read_to_string(plan_path).ok()?;
    let plan: Value = serde_json::from_str(&text).ok()?;
    plan.get("prd_ref")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn dir_name(run_dir: &Path) -> String {
    run_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| run_dir.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use serde_json::json;

    fn envelopes(values: Vec<Value>) -> Vec<RunEnvelope> {
        values
            .into_iter()
            .map(|v| RunEnvelope::from_value(v).unwrap())
            .collect()
    }

    fn summary_of(values: Vec<Value>) -> RunSummary {
        summarize(
            Path::new("/tmp/runs/run-42"),
            &envelopes(values),
            &AggregateOptions::default(),
        )
    }

    fn write(dir: &Path, name: &str, value: &Value) {
        fs::write(dir.join(name), serde_json::to_string(value).unwrap()).unwrap();
    }

    #[test]
    fn test_pass_rate_arithmetic() {
        let s = summary_of(vec![
            json!({"tests": {"passed": true}}),
            json!({"tests": {"passed": false}}),
            json!({"tests": {"passed": true}}),
        ]);
        assert_eq!(s.tests.runs, 3);
        assert_eq!(s.tests.passed, 2);
        assert_eq!(s.tests.failed, 1);
        assert_eq!(s.tests.pass_rate, Some(0.667));
    }

    #[test]
    fn test_pass_rate_absent_without_tests() {
        let s = summary_of(vec![json!({"status": "completed"})]);
        assert_eq!(s.tests.runs, 0);
        assert_eq!(s.tests.pass_rate, None);
    }

    #[test]
    fn test_non_boolean_passed_counts_as_failed_run() {
        let s = summary_of(vec![json!({"tests": {"passed": "true"}})]);
        assert_eq!(s.tests.runs, 1);
        assert_eq!(s.tests.passed, 0);
        assert_eq!(s.tests.failed, 1);
        assert_eq!(s.tests.pass_rate, Some(0.0));
    }

    #[test]
    fn test_cost_totals_by_model() {
        let s = summary_of(vec![
            json!({"costs": {"model": "gpt", "usd_estimate": 0.01, "input_tokens": 100, "output_tokens": 10, "tool_calls": 2}}),
            json!({"costs": {"model": "gpt", "usd_estimate": 0.02, "input_tokens": 50, "output_tokens": 5, "tool_calls": 1}}),
        ]);
        assert_eq!(s.costs.usd_estimate, 0.03);
        let gpt = &s.costs.by_model["gpt"];
        assert_eq!(gpt.usd_estimate, 0.03);
        assert_eq!(gpt.count, 2);
        assert_eq!(gpt.input_tokens, 150);
        assert_eq!(gpt.tool_calls, 3);
        assert_eq!(s.costs.input_tokens, 150);
        assert_eq!(s.costs.output_tokens, 15);
        assert_eq!(s.costs.tool_calls, 3);
    }

    #[test]
    fn test_costs_without_model_count_only_in_totals() {
        let s = summary_of(vec![
            json!({"costs": {"input_tokens": 7}}),
            json!({"costs": {"model": "a", "input_tokens": 3}}),
            json!({"costs": {"model": "b", "input_tokens": "4"}}),
        ]);
        assert_eq!(s.costs.input_tokens, 14);
        assert_eq!(s.costs.by_model.len(), 2);
        assert_eq!(s.costs.by_model["b"].input_tokens, 4);
    }

    #[test]
    fn test_status_buckets() {
        let s = summary_of(vec![
            json!({"status": "completed"}),
            json!({"status": "Completed"}),
            json!({"status": "failed"}),
            json!({"status": "blocked"}),
            json!({"status": "skipped"}),
            json!({"status": "in_progress"}),
            json!({"status": "weird"}),
            json!({}),
        ]);
        assert_eq!(s.tasks.total, 8);
        assert_eq!(s.tasks.completed, 2);
        assert_eq!(s.tasks.failed, 1);
        assert_eq!(s.tasks.blocked, 1);
        assert_eq!(s.tasks.skipped, 1);
        assert_eq!(s.tasks.in_progress, 1);
        assert_eq!(s.tasks.other, 2);
    }

    #[test]
    fn test_task_index() {
        let s = summary_of(vec![
            json!({"task_id": "T-1", "status": "completed", "commit": {"message": "feat: x"}}),
            json!({"status": "failed"}),
        ]);
        assert_eq!(
            s.tasks.index[0],
            TaskIndexEntry {
                task_id: Some(json!("T-1")),
                status: Some(json!("completed")),
                message: Some(json!("feat: x")),
            }
        );
        assert_eq!(s.tasks.index[1].task_id, None);
        assert_eq!(s.tasks.index[1].message, None);
    }

    #[test]
    fn test_file_ops_dedup_and_renames() {
        let s = summary_of(vec![
            json!({"files": [
                {"op": "create", "path": "a.rs"},
                {"op": "update", "path": "b.rs"},
                {"op": "rename", "path": "c.rs", "prev_path": "old.rs"}
            ]}),
            json!({"files": [
                {"op": "create", "path": "a.rs"},
                {"op": "update", "path": "b.rs"},
                {"op": "delete", "path": "d.rs"},
                {"op": "rename", "path": "c.rs", "prev_path": "old.rs"}
            ]}),
        ]);
        assert_eq!(s.files.created, 1);
        assert_eq!(s.files.updated, 1);
        assert_eq!(s.files.deleted, 1);
        assert_eq!(s.files.renamed, 2);
        assert_eq!(s.files.created_paths, vec!["a.rs"]);
        assert_eq!(
            s.files.renamed_paths[0],
            RenameEvent {
                from: Some("old.rs".to_string()),
                to: "c.rs".to_string()
            }
        );
    }

    #[test]
    fn test_path_samples_are_capped() {
        let files: Vec<Value> = (0..60)
            .map(|i| json!({"op": "create", "path": format!("f{}.rs", i)}))
            .collect();
        let s = summary_of(vec![json!({ "files": files })]);
        assert_eq!(s.files.created, 60);
        assert_eq!(s.files.created_paths.len(), 50);
        assert_eq!(s.files.created_paths[0], "f0.rs");

        let small = AggregateOptions {
            path_sample_limit: 5,
            ..AggregateOptions::default()
        };
        let s = summarize(
            Path::new("run"),
            &envelopes(vec![json!({"files": [
                {"op": "update", "path": "1"}, {"op": "update", "path": "2"},
                {"op": "update", "path": "3"}, {"op": "update", "path": "4"},
                {"op": "update", "path": "5"}, {"op": "update", "path": "6"}
            ]})]),
            &small,
        );
        assert_eq!(s.files.updated, 6);
        assert_eq!(s.files.updated_paths.len(), 5);
    }

    #[test]
    fn test_time_bounds() {
        let s = summary_of(vec![
            json!({"metadata": {"created_at": "2025-08-29T12:00:05Z"}}),
            json!({"metadata": {"created_at": "2025-08-29T12:00:00Z"}}),
            json!({"metadata": {"created_at": "not a date"}}),
            json!({"metadata": {"created_at": "2025-08-29T14:00:00+02:00"}}),
        ]);
        assert_eq!(s.started_at.as_deref(), Some("2025-08-29T12:00:00.000Z"));
        assert_eq!(s.finished_at.as_deref(), Some("2025-08-29T12:00:05.000Z"));
        assert_eq!(s.duration_ms, Some(5000));
    }

    #[test]
    fn test_time_bounds_absent() {
        let s = summary_of(vec![json!({"metadata": {"created_at": "garbage"}})]);
        assert_eq!(s.started_at, None);
        assert_eq!(s.finished_at, None);
        assert_eq!(s.duration_ms, None);
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        assert_eq!(
            parse_timestamp("2025-08-29T12:34:56").map(format_timestamp),
            Some("2025-08-29T12:34:56.000Z".to_string())
        );
        assert_eq!(
            parse_timestamp("2025-08-29").map(format_timestamp),
            Some("2025-08-29T00:00:00.000Z".to_string())
        );
    }

    #[test]
    fn test_references() {
        let s = summary_of(vec![
            json!({"run_id": "", "commit": {"branch": ""}}),
            json!({"run_id": "run-7", "commit": {"branch": "feat/x"}, "metadata": {"plan_ref": "plans/p.json"}}),
            json!({"run_id": "run-8", "commit": {"branch": "feat/y"}}),
        ]);
        assert_eq!(s.run_id, "run-7");
        assert_eq!(s.branch.as_deref(), Some("feat/x"));
        assert_eq!(s.plan_ref.as_deref(), Some("plans/p.json"));
        assert_eq!(s.prd_ref, None);
        assert_eq!(s.schema_version, "1.0.0");
    }

    #[test]
    fn test_run_id_falls_back_to_dir_name() {
        let s = summary_of(vec![json!({"status": "completed"})]);
        assert_eq!(s.run_id, "run-42");
    }

    #[test]
    fn test_prd_ref_read_from_local_plan() {
        let env = TestEnv::new();
        let run = env.run_dir("r1");
        write(&run, "plan.json", &json!({"prd_ref": "PRD-2025-08-login"}));
        write(
            &run,
            "task-1.json",
            &json!({"status": "completed", "metadata": {"plan_ref": "plan.json"}}),
        );

        let Aggregation::Summary(s) = aggregate_run(&run, &AggregateOptions::default()).unwrap()
        else {
            panic!("expected a summary");
        };
        assert_eq!(s.prd_ref.as_deref(), Some("PRD-2025-08-login"));
    }

    #[test]
    fn test_corrupt_envelopes_are_skipped() {
        let env = TestEnv::new();
        let run = env.run_dir("r1");
        write(&run, "task-1.json", &json!({"status": "completed"}));
        fs::write(run.join("task-2.json"), "{ truncated").unwrap();
        write(&run, "task-3.json", &json!([1, 2, 3]));

        let Aggregation::Summary(s) = aggregate_run(&run, &AggregateOptions::default()).unwrap()
        else {
            panic!("expected a summary");
        };
        assert_eq!(s.tasks.total, 1);
        assert_eq!(s.tasks.completed, 1);
        assert_eq!(s.run_id, "r1");
    }

    #[test]
    fn test_no_envelopes() {
        let env = TestEnv::new();
        let run = env.run_dir("empty");
        assert_eq!(
            aggregate_run(&run, &AggregateOptions::default()).unwrap(),
            Aggregation::NoEnvelopes
        );

        fs::write(run.join("task-1.json"), "not json").unwrap();
        assert_eq!(
            aggregate_run(&run, &AggregateOptions::default()).unwrap(),
            Aggregation::NoEnvelopes
        );
    }

    #[test]
    fn test_summary_file_is_not_an_envelope() {
        let env = TestEnv::new();
        let run = env.run_dir("r1");
        write(&run, "task-1.json", &json!({"status": "completed"}));
        write(&run, "task-summary.json", &json!({"status": "failed"}));

        let options = AggregateOptions {
            summary_file: "task-summary.json".to_string(),
            ..AggregateOptions::default()
        };
        let Aggregation::Summary(s) = aggregate_run(&run, &options).unwrap() else {
            panic!("expected a summary");
        };
        assert_eq!(s.tasks.total, 1);
    }
}
