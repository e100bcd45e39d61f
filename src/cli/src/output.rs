//! Output formatting utilities for the missionlog CLI.
//!
//! Supports table, JSON, and YAML output formats.

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use missionlog_core::reducers::Anomaly;

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

/// Print a success message to stdout.
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

/// Print a warning to stderr.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// Print a list of items in the requested format.
///
/// For table output, items must implement `Tabled`. For JSON/YAML, items must
/// implement `Serialize`.
pub fn print_list<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No results found.".dimmed());
                return Ok(());
            }
            let table = Table::new(items)
                .with(Style::rounded())
                .with(Modify::new(Columns::first()).with(Alignment::left()))
                .to_string();
            println!("{}", table);
        }
        _ => print_item(&items, format)?,
    }
    Ok(())
}

/// Print a single item in the requested format.
pub fn print_item<T: Serialize + ?Sized>(item: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            let json = serde_json::to_string_pretty(item).context("Failed to serialize to JSON")?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(item).context("Failed to serialize to YAML")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

/// Print key-value details to the terminal (non-JSON/YAML output).
pub fn print_detail(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Print a section header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

#[derive(Serialize, Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Event")]
    event_id: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Print the anomaly section of a reduction in table form.
pub fn print_anomalies(anomalies: &[Anomaly]) -> Result<()> {
    if anomalies.is_empty() {
        print_success("No anomalies");
        return Ok(());
    }
    print_header(&format!("Anomalies ({})", anomalies.len()));
    let rows: Vec<AnomalyRow> = anomalies
        .iter()
        .map(|a| AnomalyRow {
            kind: a.kind.to_string(),
            event_id: a.event_id.to_string(),
            message: a.message.clone(),
        })
        .collect();
    print_list(&rows, OutputFormat::Table)
}
