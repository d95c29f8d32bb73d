//! bl - task lifecycle tracking and run summaries for automated workers.

use backlog::cli::{Cli, Commands};
use backlog::commands::{self, Output, RunTarget, SummaryMode};
use backlog::config::{ConfigOverrides, ResolvedSettings, resolve_settings};
use backlog::logging::init_logging;
use backlog::runs::GcOptions;
use clap::Parser;
use std::io::Read;
use std::process;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    init_logging(cli.log_level);

    let overrides = ConfigOverrides {
        state_dir: cli.state_dir,
        store_file: cli.store_file,
    };

    let result = resolve_settings(&overrides).and_then(|settings| {
        tracing::debug!(
            state_dir = %settings.state_dir.value.display(),
            store_file = %settings.store_file.value.display(),
            "resolved settings"
        );
        run_command(cli.command, &settings, human)
    });

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(e.exit_code());
    }
}

fn run_command(
    command: Commands,
    settings: &ResolvedSettings,
    human: bool,
) -> Result<(), backlog::Error> {
    match command {
        Commands::Transition { id, status } => {
            let result = commands::transition(&settings.store(), &id, &status)?;
            output(&result, human);
        }
        Commands::Upsert => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let result = commands::upsert(&settings.store(), &input)?;
            output(&result, human);
        }
        Commands::Resume => {
            let result = commands::resume(&settings.store())?;
            output(&result, human);
        }
        Commands::Blocked => {
            let result = commands::blocked(&settings.store())?;
            output(&result, human);
        }
        Commands::RunSummary {
            run_id,
            all: _,
            out,
            stdout,
            confirm,
        } => {
            let target = match run_id {
                Some(id) => RunTarget::Named(id),
                None => RunTarget::All,
            };
            let mode = if stdout {
                SummaryMode::Stdout
            } else if confirm {
                SummaryMode::Confirm
            } else {
                SummaryMode::DryRun
            };
            let result = commands::run_summary(settings, &target, out.as_deref(), mode)?;
            output(&result, human);
        }
        Commands::Gc {
            older_than_days,
            keep_latest,
            prd_id,
            confirm,
        } => {
            let options = GcOptions {
                older_than_days,
                keep_latest,
                prd_id,
                confirm,
                summary_file: settings.summary_file.value.clone(),
            };
            let result = commands::gc(settings, &options)?;
            output(&result, human);
        }
        Commands::Config => {
            output(commands::config_show(settings), human);
        }
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
