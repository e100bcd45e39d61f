//! `missionlog merge`: CRDT merges over one payload field.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use missionlog_core::merge::{merge_counter, merge_gset};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct FieldArgs {
    /// Payload field to merge
    #[arg(long)]
    field: String,

    /// JSON-lines event file
    #[arg(short, long)]
    file: PathBuf,

    /// Only merge events of this aggregate
    #[arg(short, long)]
    aggregate: Option<String>,
}

#[derive(Subcommand)]
pub enum MergeCommands {
    /// Sum an integer field over distinct events
    Counter(FieldArgs),

    /// Union a field's values into a grow-only set
    Gset(FieldArgs),
}

#[derive(Serialize)]
struct CounterResult<'a> {
    field: &'a str,
    events: usize,
    total: i64,
}

#[derive(Serialize)]
struct SetResult<'a> {
    field: &'a str,
    events: usize,
    elements: Vec<String>,
}

pub fn execute(cmd: MergeCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        MergeCommands::Counter(args) => {
            let events = super::load_events(&args.file, args.aggregate.as_deref())?;
            let result = CounterResult {
                field: &args.field,
                events: events.len(),
                total: merge_counter(&events, &args.field),
            };
            match format {
                OutputFormat::Table => {
                    output::print_detail(&result.field.to_string(), &result.total.to_string());
                    Ok(())
                }
                _ => output::print_item(&result, format),
            }
        }
        MergeCommands::Gset(args) => {
            let events = super::load_events(&args.file, args.aggregate.as_deref())?;
            let set = merge_gset(&events, &args.field);
            let result = SetResult {
                field: &args.field,
                events: events.len(),
                elements: set.iter().cloned().collect(),
            };
            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("{} ({} elements)", result.field, result.elements.len()));
                    for element in &result.elements {
                        println!("  {}", element);
                    }
                    Ok(())
                }
                _ => output::print_item(&result, format),
            }
        }
    }
}
