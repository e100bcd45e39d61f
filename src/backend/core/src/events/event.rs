//! The canonical event envelope.
//!
//! An [`Event`] is an immutable fact: identity, causal metadata, tenant
//! scoping and an opaque JSON payload whose shape is selected by
//! `event_type`. Events are never mutated after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;
use uuid::Uuid;

use crate::clock::LamportClock;
use crate::error::{MissionLogError, Result};
use crate::events::kind::EventKind;

/// Schema version stamped on events built by this crate.
pub const SCHEMA_VERSION: &str = "1.0.0";

// =============================================================================
// Event IDs
// =============================================================================

/// Unique, time-sortable event identifier (a ULID in canonical text form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generate a fresh ULID.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Wrap an existing identifier without checking its shape.
    ///
    /// Envelope validation reports identifiers that are not ULIDs.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse and canonicalize a ULID string.
    pub fn parse(id: &str) -> Result<Self> {
        Ulid::from_string(id)
            .map(|ulid| Self(ulid.to_string()))
            .map_err(|e| MissionLogError::invalid_event_id(id, e))
    }

    /// Whether the identifier is a well-formed ULID.
    pub fn is_ulid(&self) -> bool {
        Ulid::from_string(&self.0).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self::from_raw(id)
    }
}

impl From<Ulid> for EventId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

// =============================================================================
// Event
// =============================================================================

/// Immutable event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dedup key and final sort tie-breaker
    pub event_id: EventId,

    /// Wire tag selecting the payload schema and reducer routing
    pub event_type: String,

    /// Entity this event mutates
    pub aggregate_id: String,

    /// Wall-clock capture time; informational only
    pub timestamp: DateTime<Utc>,

    /// Producing process or actor
    pub node_id: String,

    /// Causal order proxy
    pub lamport_clock: u64,

    /// Event that directly caused this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<EventId>,

    /// Groups events of one logical operation
    #[serde(default)]
    pub correlation_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_uuid: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_slug: Option<String>,

    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Event {
    /// Start building an event of the given type for one aggregate.
    pub fn builder(event_type: impl Into<String>, aggregate_id: impl Into<String>) -> EventBuilder {
        EventBuilder::new(event_type, aggregate_id)
    }

    /// The catalog entry for this event's type, if known.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::parse(&self.event_type)
    }

    /// Read a string field from the payload.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(|v| v.as_str())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Event`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event_id: Option<EventId>,
    event_type: String,
    aggregate_id: String,
    timestamp: Option<DateTime<Utc>>,
    node_id: String,
    lamport_clock: u64,
    causation_id: Option<EventId>,
    correlation_id: Option<String>,
    project_uuid: Option<Uuid>,
    project_slug: Option<String>,
    schema_version: String,
    payload: serde_json::Value,
}

impl EventBuilder {
    fn new(event_type: impl Into<String>, aggregate_id: impl Into<String>) -> Self {
        Self {
            event_id: None,
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            timestamp: None,
            node_id: "local".to_string(),
            lamport_clock: 0,
            causation_id: None,
            correlation_id: None,
            project_uuid: None,
            project_slug: None,
            schema_version: default_schema_version(),
            payload: empty_payload(),
        }
    }

    pub fn with_event_id(mut self, id: impl Into<EventId>) -> Self {
        self.event_id = Some(id.into());
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the causation ID.
    pub fn with_causation(mut self, id: impl Into<EventId>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Set the correlation ID.
    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_project(mut self, uuid: Uuid, slug: impl Into<String>) -> Self {
        self.project_uuid = Some(uuid);
        self.project_slug = Some(slug.into());
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    pub fn lamport_clock(mut self, value: u64) -> Self {
        self.lamport_clock = value;
        self
    }

    /// Use a raw JSON payload.
    pub fn with_payload_value(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Serialize a typed payload into the envelope.
    pub fn payload(mut self, payload: impl Serialize) -> Result<Self> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    /// Tick the clock and stamp the builder with the clock's node and value.
    pub fn stamp(mut self, clock: &LamportClock) -> Result<Self> {
        self.lamport_clock = clock.tick()?;
        self.node_id = clock.node_id().to_string();
        Ok(self)
    }

    pub fn build(self) -> Event {
        let event_id = self.event_id.unwrap_or_default();
        Event {
            correlation_id: self
                .correlation_id
                .unwrap_or_else(|| event_id.as_str().to_string()),
            event_id,
            event_type: self.event_type,
            aggregate_id: self.aggregate_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            node_id: self.node_id,
            lamport_clock: self.lamport_clock,
            causation_id: self.causation_id,
            project_uuid: self.project_uuid,
            project_slug: self.project_slug,
            schema_version: self.schema_version,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::InMemoryClockStorage;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_generated_ids_are_ulids() {
        let id = EventId::new();
        assert!(id.is_ulid());
        assert_eq!(id.as_str().len(), 26);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let error = EventId::parse("not-a-ulid").unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::InvalidEventId);
        assert_eq!(error.details().entity_id.as_deref(), Some("not-a-ulid"));
        let id = EventId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
        assert!(id.is_ulid());
    }

    #[test]
    fn test_builder_defaults() {
        let event = Event::builder("MissionStarted", "mission-1").build();
        assert_eq!(event.schema_version, SCHEMA_VERSION);
        assert_eq!(event.correlation_id, event.event_id.as_str());
        assert_eq!(event.payload, json!({}));
        assert_eq!(event.kind(), Some(EventKind::MissionStarted));
    }

    #[test]
    fn test_builder_with_payload() {
        let event = Event::builder("PhaseEntered", "mission-1")
            .with_event_id("e1")
            .with_node("node-a")
            .lamport_clock(7)
            .payload(json!({"phase": "implement"}))
            .unwrap()
            .build();

        assert_eq!(event.event_id.as_str(), "e1");
        assert_eq!(event.lamport_clock, 7);
        assert_eq!(event.payload_str("phase"), Some("implement"));
    }

    #[test]
    fn test_stamp_ticks_the_clock() {
        let clock = LamportClock::new("node-a", Arc::new(InMemoryClockStorage::new()));
        let first = Event::builder("MissionCreated", "m").stamp(&clock).unwrap().build();
        let second = Event::builder("MissionStarted", "m").stamp(&clock).unwrap().build();

        assert_eq!(first.lamport_clock, 1);
        assert_eq!(second.lamport_clock, 2);
        assert_eq!(second.node_id, "node-a");
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let event: Event = serde_json::from_value(json!({
            "event_id": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "event_type": "MissionStarted",
            "aggregate_id": "m",
            "timestamp": "2026-01-01T00:00:00Z",
            "node_id": "n",
            "lamport_clock": 3
        }))
        .unwrap();

        assert_eq!(event.schema_version, "1.0.0");
        assert!(event.causation_id.is_none());
        assert_eq!(event.payload, json!({}));
    }
}
