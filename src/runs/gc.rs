//! Pruning of old run directories.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Selection rules for [`collect_garbage`].
#[derive(Debug, Clone, Default)]
pub struct GcOptions {
    /// Only runs older than this many days; 0 disables the age filter
    pub older_than_days: u64,
    /// The newest K runs (after the PRD filter) are always kept
    pub keep_latest: usize,
    /// Restrict candidates to runs belonging to this PRD
    pub prd_id: Option<String>,
    /// Delete for real; otherwise only report
    pub confirm: bool,
    /// Summary filename consulted for the PRD filter
    pub summary_file: String,
}

/// A run directory selected for deletion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GcCandidate {
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GcReport {
    pub candidates: Vec<GcCandidate>,
    pub deleted: usize,
    pub failed: usize,
    pub dry_run: bool,
}

/// Select run directories under `runs_dir` per `options` and delete them when
/// `options.confirm` is set. A missing `runs_dir` yields an empty report.
pub fn collect_garbage(runs_dir: &Path, options: &GcOptions, now: SystemTime) -> Result<GcReport> {
    let mut report = GcReport {
        candidates: Vec::new(),
        deleted: 0,
        failed: 0,
        dry_run: !options.confirm,
    };
    if !runs_dir.is_dir() {
        tracing::debug!(runs_dir = %runs_dir.display(), "no runs directory, nothing to prune");
        return Ok(report);
    }

    let mut runs: Vec<(PathBuf, SystemTime)> = super::list_run_dirs(runs_dir)?
        .into_iter()
        .map(|dir| {
            let mtime = dir_mtime(&dir);
            (dir, mtime)
        })
        .collect();
    // newest first
    runs.sort_by(|a, b| b.1.cmp(&a.1));

    if let Some(prd) = options.prd_id.as_deref().filter(|p| !p.is_empty()) {
        runs.retain(|(dir, _)| belongs_to_prd(dir, prd, &options.summary_file));
    }

    let max_age = Duration::from_secs(options.older_than_days.saturating_mul(SECS_PER_DAY));
    report.candidates = runs
        .into_iter()
        .skip(options.keep_latest)
        .filter(|(_, mtime)| {
            options.older_than_days == 0
                || now.duration_since(*mtime).is_ok_and(|age| age > max_age)
        })
        .map(|(path, mtime)| GcCandidate {
            path,
            modified_at: DateTime::<Utc>::from(mtime),
        })
        .collect();

    if !options.confirm {
        return Ok(report);
    }

    for candidate in &report.candidates {
        match fs::remove_dir_all(&candidate.path) {
            Ok(()) => {
                report.deleted += 1;
                tracing::info!(path = %candidate.path.display(), "deleted run directory");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(path = %candidate.path.display(), error = %e, "failed to delete run directory");
            }
        }
    }
    Ok(report)
}

fn dir_mtime(dir: &Path) -> SystemTime {
    fs::metadata(dir)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Whether the run's summary names `prd` (in `prd_ref` or `prd_id`), or its
/// directory name contains it.
fn belongs_to_prd(run_dir: &Path, prd: &str, summary_file: &str) -> bool {
    let from_summary = fs::read_to_string(run_dir.join(summary_file))
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .is_some_and(|summary| {
            ["prd_ref", "prd_id"].iter().any(|key| match summary.get(key) {
                Some(Value::String(s)) => s.contains(prd),
                Some(Value::Null) | None => false,
                Some(other) => other.to_string().contains(prd),
            })
        });
    from_summary
        || run_dir
            .file_name()
            .is_some_and(|name| name.to_string_lossy().contains(prd))
}
