//! CLI argument definitions for backlog.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Backlog - task lifecycle tracking and run summaries for automated workers.
///
/// Tasks live in `<state-dir>/tasks.jsonl`; run envelopes in
/// `<state-dir>/runs/<run-id>/task-*.json`.
#[derive(Parser, Debug)]
#[command(name = "bl")]
#[command(author, version, about = "Track a task backlog and summarize task runs", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Root of the task store and run data [env: BACKLOG_STATE_DIR] [default: ./state]
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Task store file, overriding `<state-dir>/tasks.jsonl` [env: BACKLOG_STORE_FILE]
    #[arg(long, global = true, value_name = "FILE")]
    pub store_file: Option<PathBuf>,

    /// Logging level. If omitted, `BACKLOG_LOG` or `warn` is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Move a task to a new status
    ///
    /// Allowed moves: Planned -> InProgress|Blocked, InProgress -> Review|Blocked,
    /// Review -> Done|InProgress, Blocked -> InProgress. Done is terminal.
    /// Exits 2 when the move is not allowed.
    Transition {
        /// Task ID
        id: String,
        /// Target status (e.g. InProgress, in_progress, in-progress)
        status: String,
    },

    /// Merge tasks from stdin into the store
    ///
    /// Reads one JSON task object or an array of them. Fields are merged over
    /// the stored task with the same id; unknown ids are appended.
    Upsert,

    /// Show the next runnable task
    ///
    /// A task is runnable when it is Planned and all of its deps are Done.
    /// Lower priority rank (P0 first) wins; ties keep store order.
    Resume,

    /// List planned tasks held back by unmet dependencies, and dependency cycles
    Blocked,

    /// Aggregate a run's task envelopes into a summary
    ///
    /// Dry-run by default: shows the path that would be written.
    #[command(group(
        clap::ArgGroup::new("target").required(true).args(["run_id", "all"])
    ))]
    RunSummary {
        /// Run directory name under `<state-dir>/runs`
        #[arg(long)]
        run_id: Option<String>,

        /// Summarize every run directory
        #[arg(long)]
        all: bool,

        /// Summary filename inside the run directory [default: summary.json]
        #[arg(long, value_name = "NAME")]
        out: Option<String>,

        /// Print only the summary JSON, write nothing
        #[arg(long, conflicts_with = "confirm")]
        stdout: bool,

        /// Write the summary file
        #[arg(long)]
        confirm: bool,
    },

    /// Prune old run directories
    ///
    /// Dry-run by default: lists candidates without deleting.
    Gc {
        /// Only prune runs last modified more than N days ago (0 = any age)
        #[arg(long, default_value_t = 0, value_name = "N")]
        older_than_days: u64,

        /// Always keep the newest K runs
        #[arg(long, default_value_t = 0, value_name = "K")]
        keep_latest: usize,

        /// Only prune runs belonging to this PRD (summary prd_ref/prd_id or directory name)
        #[arg(long, value_name = "ID")]
        prd_id: Option<String>,

        /// Delete the candidates
        #[arg(long)]
        confirm: bool,
    },

    /// Show resolved settings and where each value came from
    Config,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
