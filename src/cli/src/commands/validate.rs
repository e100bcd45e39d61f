//! `missionlog validate`: check envelopes and payloads against the catalog.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use missionlog_core::events::{CatalogValidator, PayloadValidator};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ValidateArgs {
    /// JSON-lines event file
    #[arg(short, long)]
    file: PathBuf,

    /// Accept event ids that are not ULIDs
    #[arg(long)]
    lenient: bool,

    /// Only list events that fail
    #[arg(long)]
    failures_only: bool,
}

#[derive(Serialize, Tabled)]
struct ValidationRow {
    #[tabled(rename = "Event")]
    event_id: String,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Valid")]
    valid: bool,
    #[tabled(rename = "Violations")]
    violations: String,
}

pub fn execute(args: ValidateArgs, format: OutputFormat) -> Result<()> {
    let events = super::load_events(&args.file, None)?;
    let validator = if args.lenient {
        CatalogValidator::lenient()
    } else {
        CatalogValidator::new()
    };

    let mut rows = Vec::with_capacity(events.len());
    for event in &events {
        let report = validator
            .validate_envelope(event)
            .merge(validator.validate(&event.event_type, &event.payload));
        let violations: Vec<String> = report
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        rows.push(ValidationRow {
            event_id: event.event_id.to_string(),
            event_type: event.event_type.clone(),
            valid: report.valid,
            violations: violations.join("; "),
        });
    }

    let failed = rows.iter().filter(|r| !r.valid).count();
    if args.failures_only {
        rows.retain(|r| !r.valid);
    }
    output::print_list(&rows, format)?;

    if failed > 0 {
        bail!("{} of {} events failed validation", failed, events.len());
    }
    if matches!(format, OutputFormat::Table) {
        output::print_success(&format!("{} events valid", events.len()));
    }
    Ok(())
}
