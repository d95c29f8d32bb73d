//! Common test utilities for backlog integration tests.
//!
//! Provides `TestEnv` for isolated state directories, so tests never touch
//! a `./state` directory in the working tree.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with an isolated state directory.
///
/// The `bl()` method returns a `Command` that sets `BACKLOG_STATE_DIR`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub work_dir: TempDir,
    pub state_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            state_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the bl binary with an isolated state directory.
    pub fn bl(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bl"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("BACKLOG_STATE_DIR", self.state_dir.path());
        cmd.env_remove("BACKLOG_STORE_FILE");
        cmd.env_remove("BACKLOG_LOG");
        cmd
    }

    pub fn state_path(&self) -> &Path {
        self.state_dir.path()
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_path().join("tasks.jsonl")
    }

    /// Write the task store from JSON values, one per line.
    pub fn seed_tasks(&self, tasks: &[serde_json::Value]) {
        let text: String = tasks.iter().map(|t| format!("{}\n", t)).collect();
        fs::write(self.store_path(), text).unwrap();
    }

    pub fn read_store(&self) -> String {
        fs::read_to_string(self.store_path()).unwrap()
    }

    /// Create `runs/<name>` under the state directory.
    pub fn run_dir(&self, name: &str) -> PathBuf {
        let dir = self.state_path().join("runs").join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Write an envelope file into a run directory.
    pub fn write_envelope(&self, run: &str, file: &str, envelope: serde_json::Value) {
        let dir = self.run_dir(run);
        fs::write(dir.join(file), envelope.to_string()).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}
