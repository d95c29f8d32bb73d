//! Storage layer for the task backlog.
//!
//! All tasks live in a single JSONL file (`tasks.jsonl` by default), one JSON
//! object per line. The file is always rewritten as a whole:
//!
//! - reads parse every line and fail on the first malformed record
//! - writes go to a temporary file in the same directory which is then renamed
//!   over the store, so readers never see a half-written file
//! - read-modify-write sequences run under an exclusive lock file
//!   (see [`lock::StoreLock`]) so concurrent writers cannot drop each other's updates

pub mod lock;

pub use lock::StoreLock;

use crate::models::Task;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Default lock acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default age after which a leftover lock file is broken.
pub const DEFAULT_STALE_LOCK: Duration = Duration::from_millis(30_000);

/// Handle to the JSONL task store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
    lock_timeout: Duration,
    stale_lock: Duration,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
            stale_lock: DEFAULT_STALE_LOCK,
        }
    }

    /// Age after which another process's lock file counts as abandoned.
    pub fn with_stale_lock(mut self, stale_lock: Duration) -> Self {
        self.stale_lock = stale_lock;
        self
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sibling lock file.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Create the store (and its directory) empty if it does not exist yet.
    fn ensure_exists(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            // append mode never truncates a file another process just created
            OpenOptions::new().create(true).append(true).open(&self.path)?;
            tracing::debug!(path = %self.path.display(), "created empty task store");
        }
        Ok(())
    }

    /// Load every task in file order.
    pub fn load(&self) -> Result<Vec<Task>> {
        self.ensure_exists()?;
        let text = fs::read_to_string(&self.path)?;
        let tasks = parse_tasks(&text)?;
        tracing::debug!(path = %self.path.display(), count = tasks.len(), "loaded tasks");
        Ok(tasks)
    }

    /// Replace the whole store with `tasks`, atomically.
    pub fn save(&self, tasks: &[Task]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for task in tasks {
                serde_json::to_writer(&mut writer, task)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(path = %self.path.display(), count = tasks.len(), "saved tasks");
        Ok(())
    }

    /// Take the exclusive store lock.
    pub fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(&self.lock_path(), self.lock_timeout, self.stale_lock)
    }

    /// Run a read-modify-write cycle under the store lock.
    ///
    /// The closure receives the freshly loaded tasks. The store is rewritten
    /// only when the closure succeeds and the task list actually changed; an
    /// error leaves the file untouched.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Task>) -> Result<T>,
    {
        let _lock = self.lock()?;
        let mut tasks = self.load()?;
        let before = tasks.clone();

        let value = f(&mut tasks)?;

        if tasks != before {
            self.save(&tasks)?;
            tracing::info!(path = %self.path.display(), count = tasks.len(), "task store updated");
        } else {
            tracing::debug!(path = %self.path.display(), "no changes, store not rewritten");
        }
        Ok(value)
    }
}

/// Parse JSONL text into tasks. Blank lines are skipped; any other line must
/// be a JSON object.
pub fn parse_tasks(text: &str) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let value: Value = serde_json::from_str(line).map_err(|e| Error::MalformedRecord {
            line: line_no,
            message: e.to_string(),
        })?;
        let task = Task::from_value(value).map_err(|_| Error::MalformedRecord {
            line: line_no,
            message: "record is not a JSON object".to_string(),
        })?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// Result of merging incoming tasks into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub tasks: Vec<Task>,
    /// Incoming records applied (including repeats of the same id)
    pub updated: usize,
    /// Ids that were not in the store before
    pub created: usize,
}

/// Merge `incoming` over `existing` by id.
///
/// Every incoming task must carry a non-empty string `id`; otherwise nothing
/// is merged. Existing tasks keep their order, new ids follow in first-seen
/// order. Duplicate ids already in the store collapse into the first position,
/// with the later record winning.
pub fn upsert_tasks(existing: Vec<Task>, incoming: Vec<Task>) -> Result<UpsertOutcome> {
    for (idx, task) in incoming.iter().enumerate() {
        if task.id().is_none() {
            return Err(Error::InvalidInput(format!(
                "task at index {} is missing a non-empty string id",
                idx
            )));
        }
    }

    let mut tasks: Vec<Task> = Vec::with_capacity(existing.len() + incoming.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for task in existing {
        match task.id().map(str::to_string) {
            Some(id) => match positions.get(&id) {
                Some(&pos) => tasks[pos] = task,
                None => {
                    positions.insert(id, tasks.len());
                    tasks.push(task);
                }
            },
            None => tasks.push(task),
        }
    }

    let updated = incoming.len();
    let mut created = 0;
    for task in incoming {
        let id = task.id().unwrap_or_default().to_string();
        match positions.get(&id) {
            Some(&pos) => tasks[pos].merge_from(task),
            None => {
                positions.insert(id, tasks.len());
                tasks.push(task);
                created += 1;
            }
        }
    }

    Ok(UpsertOutcome {
        tasks,
        updated,
        created,
    })
}
