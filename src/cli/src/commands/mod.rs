//! Subcommands.

pub mod clock;
pub mod conflicts;
pub mod merge;
pub mod order;
pub mod reduce;
pub mod validate;

use anyhow::{Context, Result};
use std::path::Path;

use missionlog_core::events::{read_jsonl, Event};

/// Read a JSON-lines event file, optionally keeping one aggregate's stream.
pub fn load_events(path: &Path, aggregate: Option<&str>) -> Result<Vec<Event>> {
    let mut events = read_jsonl(path)
        .with_context(|| format!("Failed to read events from {}", path.display()))?;
    if let Some(aggregate) = aggregate {
        events.retain(|e| e.aggregate_id == aggregate);
    }
    tracing::debug!(path = %path.display(), count = events.len(), "Loaded events");
    Ok(events)
}
