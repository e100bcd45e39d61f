//! Non-fatal inconsistencies recorded during a fold.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::{Domain, Event, EventId};
use crate::telemetry::metrics::ReductionMetrics;

/// Kinds of anomaly a reducer can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    EventBeforeRequested,
    EventBeforeCreated,
    EventBeforeOpened,
    EventBeforeProvisioned,
    EventBeforeRunStarted,
    EventAfterTerminal,
    InvalidTransition,
    FromLaneMismatch,
    ForceWithoutReason,
    SupersededByRollback,
    DuplicateDecisionId,
    UnknownDecision,
    DuplicateStart,
    InvalidOption,
    StepMismatch,
    RetryWithoutRejection,
    AttemptRegression,
    UnknownParticipant,
    ParticipantNotJoined,
    UnknownWarning,
    ScopeNotActive,
    DuplicateClarificationId,
    UnknownClarification,
    MalformedPayload,
    UnrecognizedEventType,
}

impl AnomalyKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EventBeforeRequested => "event_before_requested",
            Self::EventBeforeCreated => "event_before_created",
            Self::EventBeforeOpened => "event_before_opened",
            Self::EventBeforeProvisioned => "event_before_provisioned",
            Self::EventBeforeRunStarted => "event_before_run_started",
            Self::EventAfterTerminal => "event_after_terminal",
            Self::InvalidTransition => "invalid_transition",
            Self::FromLaneMismatch => "from_lane_mismatch",
            Self::ForceWithoutReason => "force_without_reason",
            Self::SupersededByRollback => "superseded_by_rollback",
            Self::DuplicateDecisionId => "duplicate_decision_id",
            Self::UnknownDecision => "unknown_decision",
            Self::DuplicateStart => "duplicate_start",
            Self::InvalidOption => "invalid_option",
            Self::StepMismatch => "step_mismatch",
            Self::RetryWithoutRejection => "retry_without_rejection",
            Self::AttemptRegression => "attempt_regression",
            Self::UnknownParticipant => "unknown_participant",
            Self::ParticipantNotJoined => "participant_not_joined",
            Self::UnknownWarning => "unknown_warning",
            Self::ScopeNotActive => "scope_not_active",
            Self::DuplicateClarificationId => "duplicate_clarification_id",
            Self::UnknownClarification => "unknown_clarification",
            Self::MalformedPayload => "malformed_payload",
            Self::UnrecognizedEventType => "unrecognized_event_type",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub event_id: EventId,
    pub message: String,
}

/// Append-only anomaly collector for one reduction.
#[derive(Debug)]
pub struct AnomalyLog {
    domain: Domain,
    entries: Vec<Anomaly>,
}

impl AnomalyLog {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: AnomalyKind, event: &Event, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(
            domain = %self.domain,
            kind = %kind,
            event_id = %event.event_id,
            %message,
            "Anomaly recorded"
        );
        ReductionMetrics::anomaly(self.domain.as_str(), kind.as_str());
        self.entries.push(Anomaly {
            kind,
            event_id: event.event_id.clone(),
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Anomaly> {
        self.entries
    }
}
