//! missionlog CLI - reduce, validate and inspect mission event logs.
//!
//! Every command reads a JSON-lines event file; `clock` operates on the
//! persisted Lamport clock document.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{clock, conflicts, merge, order, reduce, validate};
use missionlog_core::config::Config;
use missionlog_core::MissionLogError;
use missionlog_core::telemetry::init_telemetry;
use output::OutputFormat;

/// missionlog - deterministic reduction of mission event logs
#[derive(Parser)]
#[command(
    name = "missionlog",
    version,
    about = "Reduce and inspect mission event logs",
    long_about = "CLI tool for folding mission event logs into domain state, validating events, \
                  inspecting conflicts and managing Lamport clocks.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "MISSIONLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log reduction details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fold an event file into one domain's state
    Reduce(reduce::ReduceArgs),

    /// Validate envelopes and payloads of an event file
    Validate(validate::ValidateArgs),

    /// List concurrent event groups and how each merges
    Conflicts(conflicts::ConflictsArgs),

    /// CRDT merges over a payload field
    #[command(subcommand)]
    Merge(merge::MergeCommands),

    /// Print events in canonical or causal order
    Order(order::OrderArgs),

    /// Inspect or advance a persisted Lamport clock
    Clock(clock::ClockArgs),
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let path = path.to_str().context("Config path is not valid UTF-8")?;
            Config::from_file(path).with_context(|| format!("Failed to load config {}", path))
        }
        None => Config::load().context("Failed to load config from environment"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_ref())?;

    if cli.verbose {
        config.telemetry.logging.level = "debug".to_string();
    } else if std::env::var_os("RUST_LOG").is_none() {
        config.telemetry.logging.level = "warn".to_string();
    }
    init_telemetry(&config.telemetry)?;

    let format = cli.output;
    match cli.command {
        Commands::Reduce(args) => reduce::execute(args, format),
        Commands::Validate(args) => validate::execute(args, format),
        Commands::Conflicts(args) => conflicts::execute(args, &config, format),
        Commands::Merge(cmd) => merge::execute(cmd, format),
        Commands::Order(args) => order::execute(args, format),
        Commands::Clock(args) => clock::execute(args, &config, format),
    }
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        if let Some(core) = core_error(&e) {
            core.log();
        }
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// The coded library error behind a CLI failure, if there is one.
fn core_error(error: &anyhow::Error) -> Option<&MissionLogError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<MissionLogError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use missionlog_core::events::EventId;
    use missionlog_core::ErrorCode;

    #[test]
    fn test_core_error_found_through_context() {
        let failed: Result<EventId> = EventId::parse("bogus")
            .context("Failed to read event file")
            .context("reduce failed");
        let error = failed.unwrap_err();

        let core = core_error(&error).unwrap();
        assert_eq!(core.code(), ErrorCode::InvalidEventId);
    }

    #[test]
    fn test_plain_failure_has_no_core_error() {
        let error = anyhow::anyhow!("no events in file");
        assert!(core_error(&error).is_none());
    }
}
