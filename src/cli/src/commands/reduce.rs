//! `missionlog reduce <domain>`: fold an event file into one domain's state.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use missionlog_core::events::{Domain, Event};
use missionlog_core::reducers::{
    reduce_collaboration_events, reduce_connector_events, reduce_decision_point_events,
    reduce_glossary_events, reduce_lifecycle_events, reduce_mission_audit_events,
    reduce_mission_next_events, reduce_status_events, reduce_sync_events, Anomaly,
    StatusSnapshot,
};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ReduceArgs {
    /// Domain reducer to run (status, lifecycle, mission_audit, decision_point,
    /// connector, sync, mission_next, collaboration, glossary)
    #[arg(value_parser = parse_domain)]
    domain: Domain,

    /// JSON-lines event file
    #[arg(short, long)]
    file: PathBuf,

    /// Only fold events of this aggregate
    #[arg(short, long)]
    aggregate: Option<String>,
}

fn parse_domain(name: &str) -> Result<Domain, String> {
    Domain::parse(name).ok_or_else(|| {
        let known: Vec<&str> = Domain::ALL.iter().map(|d| d.as_str()).collect();
        format!("unknown domain '{}' (expected one of: {})", name, known.join(", "))
    })
}

#[derive(Serialize, Tabled)]
struct WorkPackageRow {
    #[tabled(rename = "WP")]
    wp_id: String,
    #[tabled(rename = "Feature")]
    feature_slug: String,
    #[tabled(rename = "Lane")]
    lane: String,
    #[tabled(rename = "Actor")]
    actor: String,
    #[tabled(rename = "Moves")]
    transitions: u32,
    #[tabled(rename = "Forced")]
    forced_transitions: u32,
}

fn print_status_table(snapshot: &StatusSnapshot) -> Result<()> {
    let rows: Vec<WorkPackageRow> = snapshot
        .work_packages
        .values()
        .map(|wp| WorkPackageRow {
            wp_id: wp.wp_id.clone(),
            feature_slug: wp.feature_slug.clone(),
            lane: wp.lane.to_string(),
            actor: wp.actor.clone().unwrap_or_default(),
            transitions: wp.transitions,
            forced_transitions: wp.forced_transitions,
        })
        .collect();
    output::print_list(&rows, OutputFormat::Table)?;

    let summary: Vec<String> = snapshot
        .summary
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(lane, count)| format!("{}={}", lane, count))
        .collect();
    output::print_detail("Lanes", &summary.join(" "));
    Ok(())
}

/// Render one snapshot: the full document for JSON/YAML, a short report for tables.
fn render<T: Serialize>(
    domain: Domain,
    snapshot: &T,
    event_count: usize,
    anomalies: &[Anomaly],
    format: OutputFormat,
    table: impl FnOnce() -> Result<()>,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_header(&format!("{} reduction", domain));
            output::print_detail("Events folded", &event_count.to_string());
            table()?;
            output::print_anomalies(anomalies)
        }
        _ => output::print_item(snapshot, format),
    }
}

pub fn execute(args: ReduceArgs, format: OutputFormat) -> Result<()> {
    let events: Vec<Event> = super::load_events(&args.file, args.aggregate.as_deref())?;
    let domain = args.domain;

    macro_rules! reduce_and_render {
        ($reduce:ident) => {{
            let snapshot = $reduce(&events);
            render(domain, &snapshot, snapshot.event_count, &snapshot.anomalies, format, || {
                output::print_item(&snapshot, OutputFormat::Json)
            })
        }};
    }

    match domain {
        Domain::Status => {
            let snapshot = reduce_status_events(&events);
            render(domain, &snapshot, snapshot.event_count, &snapshot.anomalies, format, || {
                print_status_table(&snapshot)
            })
        }
        Domain::Lifecycle => reduce_and_render!(reduce_lifecycle_events),
        Domain::MissionAudit => reduce_and_render!(reduce_mission_audit_events),
        Domain::DecisionPoint => reduce_and_render!(reduce_decision_point_events),
        Domain::Connector => reduce_and_render!(reduce_connector_events),
        Domain::Sync => reduce_and_render!(reduce_sync_events),
        Domain::MissionNext => reduce_and_render!(reduce_mission_next_events),
        Domain::Collaboration => reduce_and_render!(reduce_collaboration_events),
        Domain::Glossary => reduce_and_render!(reduce_glossary_events),
    }
}
