//! TOML schema for `backlog.toml`.
//!
//! ```toml
//! [store]
//! file = "tasks.jsonl"        # relative to the state directory
//! lock_timeout_ms = 5000
//! stale_lock_ms = 30000       # leftover lock files older than this are broken
//!
//! [runs]
//! dir = "runs"                # relative to the state directory
//! summary_file = "summary.json"
//! path_sample_limit = 50
//! ```
//!
//! Every key is optional; anything left out falls through to the built-in
//! default during resolution.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Name of the config file inside the state directory.
pub const CONFIG_FILE_NAME: &str = "backlog.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacklogConfig {
    pub store: StoreSection,
    pub runs: RunsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub file: Option<String>,
    pub lock_timeout_ms: Option<u64>,
    pub stale_lock_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunsSection {
    pub dir: Option<String>,
    pub summary_file: Option<String>,
    pub path_sample_limit: Option<usize>,
}

impl BacklogConfig {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read the config at `path`, or `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::parse(&text).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
