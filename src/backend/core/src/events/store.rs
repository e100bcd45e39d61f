//! Event store collaborator and reference adapters.
//!
//! Stores are thin: `save` is idempotent on `event_id` and `load` returns
//! events in insertion order. Ordering and dedup are the reducers' job.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::error::{ErrorCode, ErrorContext, MissionLogError, Result};
use crate::events::event::{Event, EventId};

/// Persistent event log.
pub trait EventStore: Send + Sync {
    /// Append an event. Returns `false` when an event with the same id is
    /// already stored, in which case nothing is written.
    fn save(&self, event: &Event) -> Result<bool>;

    /// Load every event, or only those of one aggregate.
    fn load(&self, aggregate_id: Option<&str>) -> Result<Vec<Event>>;
}

fn matches_aggregate(event: &Event, aggregate_id: Option<&str>) -> bool {
    aggregate_id.map_or(true, |id| event.aggregate_id == id)
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Default)]
struct MemoryLog {
    ids: HashSet<EventId>,
    events: Vec<Event>,
}

/// Volatile store for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<MemoryLog>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.log.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventStore for InMemoryEventStore {
    fn save(&self, event: &Event) -> Result<bool> {
        let mut log = self.log.write();
        if !log.ids.insert(event.event_id.clone()) {
            return Ok(false);
        }
        log.events.push(event.clone());
        Ok(true)
    }

    fn load(&self, aggregate_id: Option<&str>) -> Result<Vec<Event>> {
        Ok(self
            .log
            .read()
            .events
            .iter()
            .filter(|event| matches_aggregate(event, aggregate_id))
            .cloned()
            .collect())
    }
}

// =============================================================================
// JSON lines
// =============================================================================

/// Append-only store writing one JSON event per line.
///
/// Stored ids are indexed when the file is opened so duplicate saves are
/// rejected without rereading the file.
#[derive(Debug)]
pub struct JsonlEventStore {
    path: PathBuf,
    ids: RwLock<HashSet<EventId>>,
}

impl JsonlEventStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_error_code(ErrorCode::EventStoreFailed)?;
        }

        let ids = if path.exists() {
            read_jsonl(&path)?
                .into_iter()
                .map(|event| event.event_id)
                .collect()
        } else {
            HashSet::new()
        };

        tracing::debug!(indexed = ids.len(), "Event store opened");

        Ok(Self {
            path,
            ids: RwLock::new(ids),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventStore for JsonlEventStore {
    #[instrument(skip(self, event), fields(event_id = %event.event_id, event_type = %event.event_type))]
    fn save(&self, event: &Event) -> Result<bool> {
        let mut ids = self.ids.write();
        if ids.contains(&event.event_id) {
            tracing::debug!("Duplicate event ignored");
            return Ok(false);
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_error_code(ErrorCode::EventStoreFailed)?;
        file.write_all(line.as_bytes())
            .with_error_code(ErrorCode::EventStoreFailed)?;

        ids.insert(event.event_id.clone());
        Ok(true)
    }

    #[instrument(skip(self))]
    fn load(&self, aggregate_id: Option<&str>) -> Result<Vec<Event>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Ok(read_jsonl(&self.path)?
            .into_iter()
            .filter(|event| matches_aggregate(event, aggregate_id))
            .collect())
    }
}

/// Read a JSON-lines event file. Blank lines are skipped.
///
/// # Errors
///
/// Fails on the first line that is not a valid event, reporting its line
/// number.
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        MissionLogError::from(e).with_context("path", path.display().to_string())
    })?;

    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line).map_err(|e| {
            MissionLogError::from(e)
                .with_context("path", path.display().to_string())
                .with_context("line", index + 1)
        })?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, aggregate: &str) -> Event {
        Event::builder("MissionStarted", aggregate)
            .with_event_id(id)
            .with_payload_value(json!({}))
            .build()
    }

    #[test]
    fn test_in_memory_save_is_idempotent() {
        let store = InMemoryEventStore::new();
        assert!(store.save(&event("e1", "m1")).unwrap());
        assert!(!store.save(&event("e1", "m1")).unwrap());
        assert!(store.save(&event("e2", "m2")).unwrap());

        assert_eq!(store.len(), 2);
        assert_eq!(store.load(Some("m2")).unwrap().len(), 1);
        assert_eq!(store.load(None).unwrap().len(), 2);
    }

    #[test]
    fn test_jsonl_roundtrip_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");

        let store = JsonlEventStore::open(&path).unwrap();
        assert!(store.save(&event("e1", "m1")).unwrap());
        assert!(store.save(&event("e2", "m1")).unwrap());
        assert!(!store.save(&event("e1", "m1")).unwrap());

        let reopened = JsonlEventStore::open(&path).unwrap();
        assert!(!reopened.save(&event("e2", "m1")).unwrap());

        let loaded = reopened.load(Some("m1")).unwrap();
        let ids: Vec<_> = loaded.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::open(dir.path().join("events.jsonl")).unwrap();
        assert!(store.load(None).unwrap().is_empty());
    }

    #[test]
    fn test_read_jsonl_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();

        let err = read_jsonl(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeserializationError);
    }
}
