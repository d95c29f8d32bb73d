//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Diagnostics go to stderr so stdout only ever carries command output.
//!
//! Filter precedence:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `BACKLOG_LOG` environment variable (a level or any `EnvFilter` directive,
//!    e.g. `debug` or `backlog::storage=trace`)
//! 3. default to `warn`

use crate::cli::LogLevel;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "BACKLOG_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    // try_init only fails when a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .try_init();
}

fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_cli_level_wins() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_env_directive_used_without_flag() {
        let filter = build_filter(None, Some("backlog::storage=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_default_is_warn() {
        assert_eq!(build_filter(None, None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(
            build_filter(None, Some("  ")).max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }
}
