//! `missionlog clock`: inspect or advance a persisted Lamport clock.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use missionlog_core::clock::{ClockRegistry, FileClockStorage};
use missionlog_core::config::Config;

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ClockArgs {
    /// Node whose clock to use (defaults to `clock.node_id` from config)
    #[arg(long, global = true)]
    node: Option<String>,

    /// Clock state file (defaults to `clock.state_path` from config)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: ClockCommands,
}

#[derive(Subcommand)]
pub enum ClockCommands {
    /// Show the persisted value
    Current,

    /// Advance by one
    Tick,

    /// Merge a remote value: max(local, remote) + 1
    Update {
        /// Clock value observed on another node
        remote: u64,
    },
}

#[derive(Serialize)]
struct ClockReading {
    node_id: String,
    operation: &'static str,
    value: u64,
}

pub fn execute(args: ClockArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let node_id = args.node.unwrap_or_else(|| config.clock.node_id.clone());
    let path = args.state.unwrap_or_else(|| config.clock.state_path.clone());
    let registry = ClockRegistry::new(Arc::new(FileClockStorage::new(&path)));
    let clock = registry.clock(&node_id);

    let (operation, value) = match args.command {
        ClockCommands::Current => ("current", clock.current()),
        ClockCommands::Tick => ("tick", clock.tick()),
        ClockCommands::Update { remote } => ("update", clock.update(remote)),
    };
    let value = value.with_context(|| format!("Clock {} failed for node {}", operation, node_id))?;

    let reading = ClockReading {
        node_id,
        operation,
        value,
    };
    match format {
        OutputFormat::Table => {
            output::print_detail("Node", &reading.node_id);
            output::print_detail("Clock", &reading.value.to_string());
            output::print_detail("State", &path.display().to_string());
            Ok(())
        }
        _ => output::print_item(&reading, format),
    }
}
