//! Exclusive advisory lock around task store mutations.
//!
//! The lock is a sibling file (`tasks.jsonl.lock`) created with create-new
//! semantics. Whoever creates it owns the store until the guard is dropped,
//! which removes the file on every exit path, including errors.
//!
//! The file holds a small owner record (`pid`, `acquired_at`). A process
//! killed mid-update leaves its lock behind; once the record is older than the
//! stale bound the next writer removes it and retries.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Delay between acquisition attempts while another process holds the lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Guard for an acquired store lock.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock at `path`, retrying until `timeout` has elapsed.
    ///
    /// A lock whose owner record is older than `stale_after` is broken.
    pub fn acquire(path: &Path, timeout: Duration, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    if let Err(e) = write_owner(&mut file) {
                        drop(file);
                        if let Err(rm) = fs::remove_file(path) {
                            tracing::warn!(path = %path.display(), error = %rm, "failed to remove partial store lock");
                        }
                        return Err(e);
                    }
                    tracing::debug!(path = %path.display(), "acquired store lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if break_if_stale(path, stale_after) {
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(Error::StoreLocked {
                            path: path.to_path_buf(),
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        } else {
            tracing::debug!(path = %self.path.display(), "released store lock");
        }
    }
}

fn write_owner(file: &mut fs::File) -> Result<()> {
    let mut record = serde_json::to_vec(&LockOwner::current())?;
    record.push(b'\n');
    file.write_all(&record)?;
    file.sync_all()?;
    Ok(())
}

/// Age of the lock at `path`: from its owner record, or from the file's mtime
/// when the record is unreadable (a writer died between create and write).
fn lock_age(path: &Path) -> Option<(Duration, Option<LockOwner>)> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<LockOwner>(text.trim()) {
        Ok(owner) => {
            let age = (Utc::now() - owner.acquired_at).to_std().unwrap_or_default();
            Some((age, Some(owner)))
        }
        Err(_) => {
            let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
            let age = SystemTime::now().duration_since(modified).unwrap_or_default();
            Some((age, None))
        }
    }
}

/// Remove the lock at `path` if it is older than `stale_after`. Returns whether
/// it was removed.
fn break_if_stale(path: &Path, stale_after: Duration) -> bool {
    let Some((age, owner)) = lock_age(path) else {
        return false;
    };
    if age <= stale_after {
        return false;
    }
    // another writer may have broken and retaken it since we looked
    if lock_age(path).map(|(_, o)| o) != Some(owner.clone()) {
        return false;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::warn!(
                path = %path.display(),
                owner_pid = owner.as_ref().map(|o| o.pid),
                age_ms = age.as_millis() as u64,
                "broke stale store lock"
            );
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to break stale store lock");
            false
        }
    }
}
