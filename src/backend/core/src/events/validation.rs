//! Payload and envelope validation at the ingest boundary.
//!
//! Reducers only tolerate already-valid payloads; this module is where raw
//! events are checked against the catalog before they reach a store.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::error::{MissionLogError, Result};
use crate::events::event::Event;
use crate::events::kind::EventKind;
use crate::events::payload::DomainPayload;

// ═══════════════════════════════════════════════════════════════════════════════
// Pre-compiled Regex Patterns
// ═══════════════════════════════════════════════════════════════════════════════

/// Crockford base32 ULID.
static ULID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-7][0-9A-HJKMNP-TV-Z]{25}$").expect("Invalid ULID regex")
});

/// Project slug (lowercase letters, numbers, hyphens).
static SLUG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("Invalid slug regex")
});

static MISSING_FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"missing field `([^`]+)`").expect("Invalid missing-field regex")
});

// ═══════════════════════════════════════════════════════════════════════════════
// Violations
// ═══════════════════════════════════════════════════════════════════════════════

/// The kind of violation found on one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Field is required but was missing.
    Required,
    /// Field is present but has the wrong type or an unknown value.
    InvalidValue,
    /// Value does not match the expected pattern.
    Pattern,
    /// The event type is not in the catalog.
    UnknownEventType,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Required => "required",
            Self::InvalidValue => "invalid_value",
            Self::Pattern => "pattern",
            Self::UnknownEventType => "unknown_event_type",
        };
        f.write_str(label)
    }
}

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Dotted field path, `payload.*` for payload fields.
    pub field: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of validating one payload or envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<FieldViolation>,
}

impl ValidationReport {
    pub fn from_violations(violations: Vec<FieldViolation>) -> Self {
        Self {
            valid: violations.is_empty(),
            violations,
        }
    }

    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.violations.extend(other.violations);
        self.valid = self.violations.is_empty();
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Validator
// ═══════════════════════════════════════════════════════════════════════════════

/// Validates a raw payload against the schema of one event type.
pub trait PayloadValidator: Send + Sync {
    fn validate(&self, event_type: &str, payload: &serde_json::Value) -> ValidationReport;
}

/// Validator backed by the closed event catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogValidator {
    /// Require ULID-shaped event and causation ids
    pub require_ulid_ids: bool,
}

impl CatalogValidator {
    pub fn new() -> Self {
        Self {
            require_ulid_ids: true,
        }
    }

    /// Accept any non-empty event id.
    pub fn lenient() -> Self {
        Self {
            require_ulid_ids: false,
        }
    }

    /// Check the envelope fields that the payload schema does not cover.
    pub fn validate_envelope(&self, event: &Event) -> ValidationReport {
        let mut violations = Vec::new();

        if event.event_id.as_str().is_empty() {
            violations.push(FieldViolation::new(
                "event_id",
                ViolationKind::Required,
                "event_id must not be empty",
            ));
        } else if self.require_ulid_ids && !ULID_REGEX.is_match(event.event_id.as_str()) {
            violations.push(FieldViolation::new(
                "event_id",
                ViolationKind::Pattern,
                format!("'{}' is not a ULID", event.event_id),
            ));
        }

        if let Some(cause) = &event.causation_id {
            if self.require_ulid_ids && !ULID_REGEX.is_match(cause.as_str()) {
                violations.push(FieldViolation::new(
                    "causation_id",
                    ViolationKind::Pattern,
                    format!("'{}' is not a ULID", cause),
                ));
            }
        }

        if event.aggregate_id.trim().is_empty() {
            violations.push(FieldViolation::new(
                "aggregate_id",
                ViolationKind::Required,
                "aggregate_id must not be empty",
            ));
        }

        if event.node_id.trim().is_empty() {
            violations.push(FieldViolation::new(
                "node_id",
                ViolationKind::Required,
                "node_id must not be empty",
            ));
        }

        if let Some(slug) = &event.project_slug {
            if !SLUG_REGEX.is_match(slug) {
                violations.push(FieldViolation::new(
                    "project_slug",
                    ViolationKind::Pattern,
                    format!("'{}' is not a lowercase slug", slug),
                ));
            }
        }

        ValidationReport::from_violations(violations)
    }
}

impl PayloadValidator for CatalogValidator {
    fn validate(&self, event_type: &str, payload: &serde_json::Value) -> ValidationReport {
        let Some(kind) = EventKind::parse(event_type) else {
            return ValidationReport::from_violations(vec![FieldViolation::new(
                "event_type",
                ViolationKind::UnknownEventType,
                format!("'{}' is not a known event type", event_type),
            )]);
        };

        match DomainPayload::decode(kind, payload) {
            Ok(_) => ValidationReport::from_violations(Vec::new()),
            Err(e) => ValidationReport::from_violations(vec![violation_from_decode_error(&e)]),
        }
    }
}

fn violation_from_decode_error(error: &serde_json::Error) -> FieldViolation {
    let message = error.to_string();
    match MISSING_FIELD_REGEX.captures(&message) {
        Some(captures) => FieldViolation::new(
            format!("payload.{}", &captures[1]),
            ViolationKind::Required,
            message.clone(),
        ),
        None => FieldViolation::new("payload", ViolationKind::InvalidValue, message),
    }
}

/// Validate an event's envelope and payload, returning the decoded payload.
///
/// # Errors
///
/// Returns `PayloadValidationFailed` carrying every violation in the error
/// details.
pub fn validate_event(event: &Event) -> Result<DomainPayload> {
    validate_event_with(&CatalogValidator::new(), event)
}

/// [`validate_event`] with an explicit validator configuration.
pub fn validate_event_with(validator: &CatalogValidator, event: &Event) -> Result<DomainPayload> {
    let report = validator
        .validate_envelope(event)
        .merge(validator.validate(&event.event_type, &event.payload));

    if !report.valid {
        return Err(MissionLogError::payload_validation_failed(
            &event.event_type,
            &report.violations,
        )
        .with_context("event_id", event.event_id.as_str()));
    }

    match event.kind() {
        Some(kind) => DomainPayload::decode(kind, &event.payload).map_err(MissionLogError::from),
        None => Err(MissionLogError::unknown_event_type(&event.event_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn status_event(payload: serde_json::Value) -> Event {
        Event::builder("WPStatusChanged", "WP01")
            .with_node("node-a")
            .with_payload_value(payload)
            .build()
    }

    #[test]
    fn test_valid_event_decodes() {
        let event = status_event(json!({
            "feature_slug": "001-intro",
            "wp_id": "WP01",
            "from_lane": "planned",
            "to_lane": "claimed",
            "actor": "agent"
        }));

        let payload = validate_event(&event).unwrap();
        assert_eq!(payload.kind(), EventKind::WpStatusChanged);
    }

    #[test]
    fn test_missing_field_is_reported_by_name() {
        let report = CatalogValidator::new().validate(
            "WPStatusChanged",
            &json!({"feature_slug": "x", "from_lane": "planned", "to_lane": "claimed", "actor": "a"}),
        );

        assert!(!report.valid);
        assert_eq!(report.violations[0].field, "payload.wp_id");
        assert_eq!(report.violations[0].kind, ViolationKind::Required);
    }

    #[test]
    fn test_unknown_lane_is_invalid_value() {
        let report = CatalogValidator::new().validate(
            "WPStatusChanged",
            &json!({
                "feature_slug": "x",
                "wp_id": "WP01",
                "from_lane": "planned",
                "to_lane": "archived",
                "actor": "a"
            }),
        );

        assert!(!report.valid);
        assert_eq!(report.violations[0].kind, ViolationKind::InvalidValue);
    }

    #[test]
    fn test_unknown_event_type() {
        let report = CatalogValidator::new().validate("MissionExploded", &json!({}));
        assert_eq!(report.violations[0].kind, ViolationKind::UnknownEventType);
    }

    #[test]
    fn test_envelope_checks_ids_and_slug() {
        let event = Event::builder("MissionStarted", "m")
            .with_event_id("e-1")
            .with_project(uuid::Uuid::new_v4(), "Bad Slug")
            .build();

        let report = CatalogValidator::new().validate_envelope(&event);
        let fields: Vec<_> = report.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["event_id", "project_slug"]);

        let lenient = CatalogValidator::lenient().validate_envelope(&event);
        assert_eq!(lenient.violations.len(), 1);
    }

    #[test]
    fn test_validate_event_error_code() {
        let event = Event::builder("PhaseEntered", "m").build();
        let err = validate_event(&event).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PayloadValidationFailed);
    }
}
