//! `missionlog conflicts`: concurrent event groups and their merge outcome.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use missionlog_core::config::Config;
use missionlog_core::merge::{find_conflicts, state_machine_merge, MergeResolution};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ConflictsArgs {
    /// JSON-lines event file
    #[arg(short, long)]
    file: PathBuf,

    /// Override a state priority, e.g. `--priority done=10` (repeatable)
    #[arg(short, long = "priority", value_parser = parse_priority)]
    priorities: Vec<(String, i64)>,

    /// Payload field naming the resulting state
    #[arg(long)]
    state_field: Option<String>,
}

fn parse_priority(raw: &str) -> Result<(String, i64), String> {
    let (state, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected STATE=N, got '{}'", raw))?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid priority '{}': {}", value, e))?;
    Ok((state.trim().to_string(), value))
}

#[derive(Serialize)]
struct ConflictGroup {
    lamport_clock: u64,
    aggregate_id: String,
    resolution: MergeResolution,
}

#[derive(Serialize, Tabled)]
struct ConflictRow {
    #[tabled(rename = "Clock")]
    lamport_clock: u64,
    #[tabled(rename = "Aggregate")]
    aggregate_id: String,
    #[tabled(rename = "Events")]
    events: usize,
    #[tabled(rename = "Winner")]
    winner: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Review")]
    review: String,
}

pub fn execute(args: ConflictsArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let events = super::load_events(&args.file, None)?;

    let mut priority = config.merge.state_priority();
    if let Some(field) = args.state_field {
        priority = priority.with_state_field(field);
    }
    priority.priorities.extend(args.priorities);

    let mut groups = Vec::new();
    for group in find_conflicts(&events) {
        let first = group.first().context("Conflict group is empty")?;
        let (lamport_clock, aggregate_id) = (first.lamport_clock, first.aggregate_id.clone());
        let resolution = state_machine_merge(group, &priority)?;
        groups.push(ConflictGroup {
            lamport_clock,
            aggregate_id,
            resolution,
        });
    }

    match format {
        OutputFormat::Table => {
            let rows: Vec<ConflictRow> = groups
                .iter()
                .map(|g| ConflictRow {
                    lamport_clock: g.lamport_clock,
                    aggregate_id: g.aggregate_id.clone(),
                    events: g.resolution.conflicting_events.len(),
                    winner: g.resolution.winner.to_string(),
                    state: g.resolution.winning_state.clone().unwrap_or_else(|| "-".to_string()),
                    review: if g.resolution.requires_manual_review {
                        "manual".to_string()
                    } else {
                        "auto".to_string()
                    },
                })
                .collect();
            output::print_list(&rows, format)?;
            let manual = groups.iter().filter(|g| g.resolution.requires_manual_review).count();
            if manual > 0 {
                output::print_warning(&format!("{} group(s) need manual review", manual));
            }
            Ok(())
        }
        _ => output::print_item(&groups, format),
    }
}
