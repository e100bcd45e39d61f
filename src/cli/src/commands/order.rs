//! `missionlog order`: canonical or causal linearization of an event file.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use missionlog_core::merge::topological_sort;
use missionlog_core::ordering::{canonicalize, sequence_digest};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct OrderArgs {
    /// JSON-lines event file
    #[arg(short, long)]
    file: PathBuf,

    /// Only order events of this aggregate
    #[arg(short, long)]
    aggregate: Option<String>,

    /// Order by causation links instead of the canonical key
    #[arg(long)]
    causal: bool,
}

#[derive(Serialize, Tabled)]
struct OrderRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Clock")]
    lamport_clock: u64,
    #[tabled(rename = "Node")]
    node_id: String,
    #[tabled(rename = "Event")]
    event_id: String,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Caused by")]
    causation_id: String,
}

#[derive(Serialize)]
struct OrderReport {
    causal: bool,
    input: usize,
    digest: String,
    events: Vec<OrderRow>,
}

pub fn execute(args: OrderArgs, format: OutputFormat) -> Result<()> {
    let events = super::load_events(&args.file, args.aggregate.as_deref())?;
    let ordered = if args.causal {
        topological_sort(&events)
    } else {
        canonicalize(&events)
    };

    let report = OrderReport {
        causal: args.causal,
        input: events.len(),
        digest: sequence_digest(&events),
        events: ordered
            .iter()
            .enumerate()
            .map(|(i, e)| OrderRow {
                position: i + 1,
                lamport_clock: e.lamport_clock,
                node_id: e.node_id.clone(),
                event_id: e.event_id.to_string(),
                event_type: e.event_type.clone(),
                causation_id: e
                    .causation_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            })
            .collect(),
    };

    match format {
        OutputFormat::Table => {
            output::print_list(&report.events, format)?;
            output::print_detail(
                "Distinct events",
                &format!("{} of {} read", report.events.len(), report.input),
            );
            output::print_detail("Digest", &report.digest);
            Ok(())
        }
        _ => output::print_item(&report, format),
    }
}
