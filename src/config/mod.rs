//! Configuration for backlog.
//!
//! Settings come from an optional `backlog.toml` in the state directory,
//! environment variables and CLI flags. See [`schema`] for the file format
//! and [`resolver`] for how the layers combine.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, DEFAULT_STATE_DIR, Resolved, ResolvedSettings, STATE_DIR_ENV, STORE_FILE_ENV,
    ValueSource, resolve_settings, resolve_settings_with,
};
pub use schema::{BacklogConfig, CONFIG_FILE_NAME, RunsSection, StoreSection};
