//! Backlog - task lifecycle tracking and run summaries for automated workers.
//!
//! This library provides the core functionality for the `bl` CLI tool:
//! the JSONL task store, the status state machine, the readiness scheduler
//! and the run aggregator that folds per-task result envelopes into a summary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod runs;
pub mod scheduler;
pub mod storage;

use std::path::PathBuf;

/// Test utilities for isolated test environments.
#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::models::Task;
    use crate::storage::TaskStore;

    /// Test environment with an isolated state directory.
    pub struct TestEnv {
        /// Root of the simulated state directory
        pub state_dir: TempDir,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                state_dir: TempDir::new().unwrap(),
            }
        }

        pub fn path(&self) -> &Path {
            self.state_dir.path()
        }

        pub fn store_path(&self) -> PathBuf {
            self.path().join("tasks.jsonl")
        }

        /// Open a task store inside this environment.
        pub fn store(&self) -> TaskStore {
            TaskStore::new(self.store_path(), Duration::from_millis(200))
        }

        /// Create a run directory under `runs/` and return its path.
        pub fn run_dir(&self, name: &str) -> PathBuf {
            let dir = self.path().join("runs").join(name);
            std::fs::create_dir_all(&dir).unwrap();
            dir
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Build a task from a JSON literal.
    pub fn task(value: serde_json::Value) -> Task {
        Task::from_value(value).unwrap()
    }
}

/// Library-level error type for backlog operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse task record on line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No task-*.json envelopes found in {}", .0.display())]
    MissingEnvelopes(PathBuf),

    #[error("Run not found: {}", .0.display())]
    RunNotFound(PathBuf),

    #[error("Missing state dir: {}", .0.display())]
    MissingStateDir(PathBuf),

    #[error("Task store is locked by another process: {} (waited {waited_ms}ms)", .path.display())]
    StoreLocked { path: PathBuf, waited_ms: u64 },
}

impl Error {
    /// Process exit code for this error.
    ///
    /// Illegal transitions exit with 2 so callers can tell them apart from
    /// unknown tasks and other failures, which exit with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::IllegalTransition { .. } => 2,
            _ => 1,
        }
    }
}

/// Result type alias for backlog operations.
pub type Result<T> = std::result::Result<T, Error>;
