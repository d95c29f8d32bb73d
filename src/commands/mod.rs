//! Command implementations for the `bl` CLI.
//!
//! Each command returns a result type implementing [`Output`], so `main` can
//! print it as JSON (the default) or as human-readable text.
//!
//! - `transition` / `upsert` mutate the task store under its lock
//! - `resume` / `blocked` read a snapshot of the store
//! - `run_summary` / `gc` work on run directories
//! - `config_show` reports resolved settings

use crate::config::ResolvedSettings;
use crate::lifecycle::{self, TransitionOutcome};
use crate::models::{RunSummary, Task, TaskStatus};
use crate::runs::{self, Aggregation, GcOptions, GcReport};
use crate::scheduler::{self, BlockedTask};
use crate::storage::{TaskStore, upsert_tasks};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to a single-line JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

fn json_pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

// === transition ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionResult {
    pub task_id: String,
    pub from: String,
    pub status: String,
    pub changed: bool,
}

impl Output for TransitionResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        if self.changed {
            format!("{}: {} -> {}", self.task_id, self.from, self.status)
        } else {
            format!("{}: already {} (unchanged)", self.task_id, self.status)
        }
    }
}

/// Move task `id` to `status`.
///
/// The target is parsed leniently (`InProgress`, `in_progress`, `in-progress`).
/// A name outside the status set can never be reached and is reported as an
/// illegal transition.
pub fn transition(store: &TaskStore, id: &str, status: &str) -> Result<TransitionResult> {
    store.update(|tasks| {
        let task = tasks
            .iter_mut()
            .find(|t| t.id() == Some(id))
            .ok_or_else(|| Error::UnknownTask(id.to_string()))?;

        let Some(to) = TaskStatus::parse(status) else {
            return Err(Error::IllegalTransition {
                from: lifecycle::describe_status(task),
                to: status.to_string(),
            });
        };

        let from = lifecycle::describe_status(task);
        let outcome = lifecycle::transition(task, to)?;
        if let TransitionOutcome::Changed { from } = outcome {
            tracing::info!(task_id = id, %from, %to, "task transitioned");
        }
        Ok(TransitionResult {
            task_id: id.to_string(),
            from,
            status: to.to_string(),
            changed: outcome.changed(),
        })
    })
}

// === upsert ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertResult {
    pub updated: usize,
    pub created: usize,
    pub total: usize,
}

impl Output for UpsertResult {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Upserted {} task(s): {} new, {} in store",
            self.updated, self.created, self.total
        )
    }
}

/// Parse an upsert payload: one task object or an array of them.
pub fn parse_upsert_payload(input: &str) -> Result<Vec<Task>> {
    if input.trim().is_empty() {
        return Err(Error::InvalidInput(
            "no input on stdin; provide a JSON task or an array of tasks".to_string(),
        ));
    }
    let parsed: Value = serde_json::from_str(input)
        .map_err(|e| Error::InvalidInput(format!("input is not valid JSON: {}", e)))?;

    match parsed {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                Task::from_value(item).map_err(|_| {
                    Error::InvalidInput(format!("item at index {} is not a JSON object", idx))
                })
            })
            .collect(),
        Value::Object(_) => Ok(vec![Task::from_value(parsed)?]),
        _ => Err(Error::InvalidInput(
            "expected a JSON object or an array of objects".to_string(),
        )),
    }
}

/// Merge the tasks in `input` into the store.
pub fn upsert(store: &TaskStore, input: &str) -> Result<UpsertResult> {
    let incoming = parse_upsert_payload(input)?;
    store.update(|tasks| {
        let outcome = upsert_tasks(std::mem::take(tasks), incoming)?;
        *tasks = outcome.tasks;
        Ok(UpsertResult {
            updated: outcome.updated,
            created: outcome.created,
            total: tasks.len(),
        })
    })
}

// === resume ===

pub const NO_RUNNABLE_MESSAGE: &str = "No runnable tasks. Either none Planned or deps unmet.";

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeResult {
    Runnable(Task),
    NoneRunnable,
}

impl Output for ResumeResult {
    fn to_json(&self) -> String {
        match self {
            ResumeResult::Runnable(task) => json_line(task),
            ResumeResult::NoneRunnable => json_line(&serde_json::json!({
                "runnable": false,
                "message": NO_RUNNABLE_MESSAGE,
            })),
        }
    }

    fn to_human(&self) -> String {
        match self {
            ResumeResult::Runnable(task) => {
                let mut out = format!(
                    "Next: {} [{}]",
                    task.id().unwrap_or("(no id)"),
                    task.priority().map_or("no priority", |p| p.as_str())
                );
                if let Some(title) = task.get("title").and_then(Value::as_str) {
                    out.push_str(&format!("\n  {}", title));
                }
                out
            }
            ResumeResult::NoneRunnable => NO_RUNNABLE_MESSAGE.to_string(),
        }
    }
}

/// Select the next runnable task. Reserves nothing.
pub fn resume(store: &TaskStore) -> Result<ResumeResult> {
    let tasks = store.load()?;
    Ok(match scheduler::next_runnable(&tasks) {
        Some(task) => ResumeResult::Runnable(task.clone()),
        None => ResumeResult::NoneRunnable,
    })
}

// === blocked ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedReport {
    pub blocked: Vec<BlockedTask>,
    pub cycles: Vec<Vec<String>>,
}

impl Output for BlockedReport {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        use crate::scheduler::UnmetReason;

        if self.blocked.is_empty() && self.cycles.is_empty() {
            return "No blocked tasks.".to_string();
        }
        let mut lines = vec![format!("{} blocked task(s):", self.blocked.len())];
        for task in &self.blocked {
            lines.push(format!("  {}", task.id.as_deref().unwrap_or("(no id)")));
            for unmet in &task.unmet {
                let why = match &unmet.reason {
                    UnmetReason::Missing => "missing".to_string(),
                    UnmetReason::NotDone { status } => status.clone().unwrap_or_else(|| "(none)".to_string()),
                    UnmetReason::InvalidEntry => "not a task id".to_string(),
                };
                lines.push(format!("    waits on {} ({})", unmet.dep, why));
            }
        }
        if !self.cycles.is_empty() {
            lines.push(format!("{} dependency cycle(s):", self.cycles.len()));
            for cycle in &self.cycles {
                let mut path = cycle.clone();
                if let Some(first) = cycle.first() {
                    path.push(first.clone());
                }
                lines.push(format!("  {}", path.join(" -> ")));
            }
        }
        lines.join("\n")
    }
}

/// Report planned tasks with unmet dependencies and dependency cycles.
pub fn blocked(store: &TaskStore) -> Result<BlockedReport> {
    let tasks = store.load()?;
    Ok(BlockedReport {
        blocked: scheduler::blocked_tasks(&tasks),
        cycles: scheduler::dependency_cycles(&tasks),
    })
}

// === run-summary ===

/// What `run-summary` does with each summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    /// Report the path that would be written
    DryRun,
    /// Print the summary only
    Stdout,
    /// Write the summary file
    Confirm,
}

/// Which runs to summarize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Named(String),
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarizedRun {
    pub path: PathBuf,
    pub written: bool,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummaryReport {
    pub mode: SummaryMode,
    pub runs: Vec<SummarizedRun>,
    /// Run directories without any parsable envelope
    pub skipped: Vec<PathBuf>,
    #[serde(skip)]
    single: bool,
}

impl Output for RunSummaryReport {
    fn to_json(&self) -> String {
        if self.mode == SummaryMode::Stdout {
            return if self.single {
                self.runs.first().map(|r| json_line(&r.summary)).unwrap_or_default()
            } else {
                let summaries: Vec<&RunSummary> = self.runs.iter().map(|r| &r.summary).collect();
                json_line(&summaries)
            };
        }
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();
        for run in &self.runs {
            match self.mode {
                SummaryMode::Stdout => blocks.push(json_pretty(&run.summary)),
                SummaryMode::DryRun => blocks.push(format!(
                    "Dry-run. Would write: {}\n{}",
                    run.path.display(),
                    json_pretty(&run.summary)
                )),
                SummaryMode::Confirm => blocks.push(format!("Wrote {}", run.path.display())),
            }
        }
        for dir in &self.skipped {
            blocks.push(format!("Skipped {}: no task envelopes", dir.display()));
        }
        if self.mode == SummaryMode::DryRun && !self.single {
            blocks.push("Dry-run complete. Re-run with --confirm to write summaries.".to_string());
        }
        blocks.join("\n")
    }
}

/// Summarize one run or every run under the resolved runs directory.
///
/// `out` overrides the summary filename for this invocation.
pub fn run_summary(
    settings: &ResolvedSettings,
    target: &RunTarget,
    out: Option<&str>,
    mode: SummaryMode,
) -> Result<RunSummaryReport> {
    let state_dir = &settings.state_dir.value;
    if !state_dir.is_dir() {
        return Err(Error::MissingStateDir(state_dir.clone()));
    }
    let runs_dir = &settings.runs_dir.value;
    if !runs_dir.is_dir() {
        return Err(Error::RunNotFound(runs_dir.clone()));
    }

    let mut options = settings.aggregate_options();
    if let Some(name) = out {
        options.summary_file = plain_name("--out", name)?.to_string();
    }

    let run_dirs = match target {
        RunTarget::Named(run_id) => {
            let dir = runs_dir.join(plain_name("--run-id", run_id)?);
            if !dir.is_dir() {
                return Err(Error::RunNotFound(dir));
            }
            vec![dir]
        }
        RunTarget::All => runs::list_run_dirs(runs_dir)?,
    };

    summarize_runs(
        run_dirs,
        &options,
        mode,
        matches!(target, RunTarget::Named(_)),
    )
}

/// Accept `value` only as a single path component, so it cannot leave the
/// directory it is joined onto.
fn plain_name<'a>(flag: &str, value: &'a str) -> Result<&'a str> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains(['/', '\\']) => Ok(value),
        _ => Err(Error::InvalidInput(format!(
            "{} must be a plain name without path separators: {:?}",
            flag, value
        ))),
    }
}

fn summarize_runs(
    run_dirs: Vec<PathBuf>,
    options: &runs::AggregateOptions,
    mode: SummaryMode,
    single: bool,
) -> Result<RunSummaryReport> {
    let mut report = RunSummaryReport {
        mode,
        runs: Vec::new(),
        skipped: Vec::new(),
        single,
    };

    for dir in run_dirs {
        let aggregation = match runs::aggregate_run(&dir, options) {
            Ok(aggregation) => aggregation,
            Err(e) if single => return Err(e),
            Err(e) => {
                tracing::warn!(run_dir = %dir.display(), error = %e, "unreadable run directory, skipping run");
                report.skipped.push(dir);
                continue;
            }
        };
        match aggregation {
            Aggregation::NoEnvelopes if report.single => {
                return Err(Error::MissingEnvelopes(dir));
            }
            Aggregation::NoEnvelopes => {
                tracing::warn!(run_dir = %dir.display(), "no task envelopes, skipping run");
                report.skipped.push(dir);
            }
            Aggregation::Summary(summary) => {
                let summary = *summary;
                let (path, written) = if mode == SummaryMode::Confirm {
                    (runs::write_summary(&dir, &options.summary_file, &summary)?, true)
                } else {
                    (dir.join(&options.summary_file), false)
                };
                report.runs.push(SummarizedRun {
                    path,
                    written,
                    summary,
                });
            }
        }
    }
    Ok(report)
}

// === gc ===

impl Output for GcReport {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        if self.candidates.is_empty() {
            return "No candidates to prune.".to_string();
        }
        let mut lines = vec![format!("Candidate runs to prune: {}", self.candidates.len())];
        for c in &self.candidates {
            lines.push(format!(
                " - {} (last modified {})",
                c.path.display(),
                c.modified_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            ));
        }
        if self.dry_run {
            lines.push("Dry-run complete. Re-run with --confirm to delete the above directories.".to_string());
        } else {
            lines.push(format!(
                "Deleted {} of {} candidate run(s).",
                self.deleted,
                self.candidates.len()
            ));
            if self.failed > 0 {
                lines.push(format!("Failed to delete {} run(s).", self.failed));
            }
        }
        lines.join("\n")
    }
}

/// Prune run directories per `options`.
pub fn gc(settings: &ResolvedSettings, options: &GcOptions) -> Result<GcReport> {
    let state_dir = &settings.state_dir.value;
    if !state_dir.is_dir() {
        return Err(Error::MissingStateDir(state_dir.clone()));
    }
    runs::collect_garbage(&settings.runs_dir.value, options, SystemTime::now())
}

// === config ===

impl Output for ResolvedSettings {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        fn line(key: &str, value: impl std::fmt::Display, source: impl std::fmt::Display) -> String {
            format!("{:<18} {} ({})", key, value, source)
        }
        let path = |p: &Path| p.display().to_string();
        let mut lines = vec![
            line("state_dir", path(&self.state_dir.value), &self.state_dir.source),
            line("store_file", path(&self.store_file.value), &self.store_file.source),
            line("lock_timeout_ms", self.lock_timeout_ms.value, &self.lock_timeout_ms.source),
            line("stale_lock_ms", self.stale_lock_ms.value, &self.stale_lock_ms.source),
            line("runs_dir", path(&self.runs_dir.value), &self.runs_dir.source),
            line("summary_file", &self.summary_file.value, &self.summary_file.source),
            line("path_sample_limit", self.path_sample_limit.value, &self.path_sample_limit.source),
        ];
        match &self.config_file {
            Some(file) => lines.push(format!("config file: {}", file.display())),
            None => lines.push("config file: (none)".to_string()),
        }
        lines.join("\n")
    }
}

/// Resolved settings, for `bl config`.
pub fn config_show(settings: &ResolvedSettings) -> &ResolvedSettings {
    settings
}
