//! Precedence resolution for runtime settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`BACKLOG_STATE_DIR`, `BACKLOG_STORE_FILE`)
//! 3. `<state-dir>/backlog.toml`
//! 4. Built-in defaults
//!
//! The state directory is resolved first since it locates the config file.
//! Relative paths from the config file are taken relative to the state directory.

use crate::Result;
use crate::config::schema::{BacklogConfig, CONFIG_FILE_NAME};
use crate::runs::{AggregateOptions, DEFAULT_PATH_SAMPLE_LIMIT, DEFAULT_SUMMARY_FILE};
use crate::storage::{DEFAULT_LOCK_TIMEOUT, DEFAULT_STALE_LOCK, TaskStore};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the state directory.
pub const STATE_DIR_ENV: &str = "BACKLOG_STATE_DIR";
/// Environment variable naming the task store file explicitly.
pub const STORE_FILE_ENV: &str = "BACKLOG_STORE_FILE";

pub const DEFAULT_STATE_DIR: &str = "./state";
pub const DEFAULT_STORE_FILE: &str = "tasks.jsonl";
pub const DEFAULT_RUNS_DIR: &str = "runs";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from `backlog.toml`
    File,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::File => write!(f, "file"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for settings resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub state_dir: Option<PathBuf>,
    pub store_file: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn with_store_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.store_file = Some(file.into());
        self
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSettings {
    pub state_dir: Resolved<PathBuf>,
    /// Config file that was read, if one exists
    pub config_file: Option<PathBuf>,
    pub store_file: Resolved<PathBuf>,
    pub lock_timeout_ms: Resolved<u64>,
    pub stale_lock_ms: Resolved<u64>,
    pub runs_dir: Resolved<PathBuf>,
    pub summary_file: Resolved<String>,
    pub path_sample_limit: Resolved<usize>,
}

impl ResolvedSettings {
    /// Task store handle for the resolved store file.
    pub fn store(&self) -> TaskStore {
        TaskStore::new(
            self.store_file.value.clone(),
            Duration::from_millis(self.lock_timeout_ms.value),
        )
        .with_stale_lock(Duration::from_millis(self.stale_lock_ms.value))
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            summary_file: self.summary_file.value.clone(),
            path_sample_limit: self.path_sample_limit.value,
        }
    }
}

/// Pick the first present value in precedence order.
fn pick<T>(candidates: [(Option<T>, ValueSource); 3], default: T) -> Resolved<T> {
    candidates
        .into_iter()
        .find_map(|(value, source)| value.map(|v| Resolved::new(v, source)))
        .unwrap_or_else(|| Resolved::new(default, ValueSource::Default))
}

fn from_file<T>(value: Option<T>, default: T) -> Resolved<T> {
    match value {
        Some(v) => Resolved::new(v, ValueSource::File),
        None => Resolved::new(default, ValueSource::Default),
    }
}

/// Resolve settings using `env` for environment lookups.
pub fn resolve_settings_with<F>(overrides: &ConfigOverrides, env: F) -> Result<ResolvedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let env_nonempty = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    let state_dir = pick(
        [
            (overrides.state_dir.clone(), ValueSource::CliFlag),
            (
                env_nonempty(STATE_DIR_ENV).map(PathBuf::from),
                ValueSource::EnvVar(STATE_DIR_ENV.to_string()),
            ),
            (None, ValueSource::File),
        ],
        PathBuf::from(DEFAULT_STATE_DIR),
    );

    let config_path = state_dir.value.join(CONFIG_FILE_NAME);
    let file = BacklogConfig::load(&config_path)?;
    let config_file = file.as_ref().map(|_| config_path);
    let file = file.unwrap_or_default();
    let under_state = |p: String| state_dir.value.join(p);

    let store_file = pick(
        [
            (overrides.store_file.clone(), ValueSource::CliFlag),
            (
                env_nonempty(STORE_FILE_ENV).map(PathBuf::from),
                ValueSource::EnvVar(STORE_FILE_ENV.to_string()),
            ),
            (file.store.file.map(under_state), ValueSource::File),
        ],
        state_dir.value.join(DEFAULT_STORE_FILE),
    );

    Ok(ResolvedSettings {
        store_file,
        lock_timeout_ms: from_file(
            file.store.lock_timeout_ms,
            DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
        ),
        stale_lock_ms: from_file(file.store.stale_lock_ms, DEFAULT_STALE_LOCK.as_millis() as u64),
        runs_dir: match file.runs.dir {
            Some(dir) => Resolved::new(under_state(dir), ValueSource::File),
            None => Resolved::new(state_dir.value.join(DEFAULT_RUNS_DIR), ValueSource::Default),
        },
        summary_file: match file.runs.summary_file {
            Some(name) => Resolved::new(name, ValueSource::File),
            None => Resolved::new(DEFAULT_SUMMARY_FILE.to_string(), ValueSource::Default),
        },
        path_sample_limit: from_file(file.runs.path_sample_limit, DEFAULT_PATH_SAMPLE_LIMIT),
        config_file,
        state_dir,
    })
}

/// Resolve settings from CLI overrides and the process environment.
pub fn resolve_settings(overrides: &ConfigOverrides) -> Result<ResolvedSettings> {
    resolve_settings_with(overrides, |name| std::env::var(name).ok())
}
