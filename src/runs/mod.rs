//! Run directories and the reports derived from them.
//!
//! Layout under the state directory:
//!
//! ```text
//! <state-dir>/runs/<run-id>/task-*.json   one envelope per attempted task
//! <state-dir>/runs/<run-id>/summary.json  written by `bl run-summary --confirm`
//! ```
//!
//! - [`aggregate`] folds one run's envelopes into a [`RunSummary`]
//! - [`gc`] prunes old run directories

pub mod aggregate;
pub mod gc;

pub use aggregate::{AggregateOptions, Aggregation, aggregate_run, summarize};
pub use gc::{GcCandidate, GcOptions, GcReport, collect_garbage};

use crate::Result;
use crate::models::RunSummary;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Default summary filename inside a run directory.
pub const DEFAULT_SUMMARY_FILE: &str = "summary.json";

/// Default cap on sample path lists in a summary.
pub const DEFAULT_PATH_SAMPLE_LIMIT: usize = 50;

/// Whether a file name looks like a task envelope (`task-*.json`, any case).
///
/// The summary file is excluded even when its name would match.
pub fn is_envelope_file(name: &str, summary_file: &str) -> bool {
    if name == summary_file {
        return false;
    }
    let lower = name.to_lowercase();
    lower.contains("task-") && lower.ends_with(".json")
}

/// Envelope files of a run, sorted by file name.
pub fn envelope_files(run_dir: &Path, summary_file: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(run_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if is_envelope_file(&name.to_string_lossy(), summary_file) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Subdirectories of `runs_dir`, sorted by name.
pub fn list_run_dirs(runs_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(runs_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Write `summary` into `run_dir/file_name`, atomically. Returns the written path.
pub fn write_summary(run_dir: &Path, file_name: &str, summary: &RunSummary) -> Result<PathBuf> {
    let out_path = run_dir.join(file_name);
    let mut tmp = NamedTempFile::new_in(run_dir)?;
    serde_json::to_writer_pretty(&mut tmp, summary)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(&out_path)
        .map_err(|e| crate::Error::Io(e.error))?;
    tracing::info!(path = %out_path.display(), run_id = %summary.run_id, "wrote run summary");
    Ok(out_path)
}
