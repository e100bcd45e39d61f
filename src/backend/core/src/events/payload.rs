//! Typed payloads for every catalog event.
//!
//! [`DomainPayload`] has one variant per [`EventKind`], and
//! [`DomainPayload::decode`] is the exhaustive dispatch table from kind to
//! payload decoder. Enumerated values are normalized here, at the boundary,
//! so reducers only ever see canonical representations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MissionLogError;
use crate::events::kind::EventKind;

// =============================================================================
// Enumerated payload values
// =============================================================================

/// Work-package lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Lane {
    Planned,
    Claimed,
    InProgress,
    ForReview,
    Done,
    Blocked,
    Canceled,
}

impl Lane {
    pub const ALL: &'static [Lane] = &[
        Lane::Planned,
        Lane::Claimed,
        Lane::InProgress,
        Lane::ForReview,
        Lane::Done,
        Lane::Blocked,
        Lane::Canceled,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Lane::Planned => "planned",
            Lane::Claimed => "claimed",
            Lane::InProgress => "in_progress",
            Lane::ForReview => "for_review",
            Lane::Done => "done",
            Lane::Blocked => "blocked",
            Lane::Canceled => "canceled",
        }
    }

    /// Normalize a raw lane string, resolving aliases.
    pub fn normalize(raw: &str) -> Result<Self, MissionLogError> {
        let value = raw.trim().to_ascii_lowercase().replace('-', "_");
        let canonical = match value.as_str() {
            "doing" => "in_progress",
            "cancelled" => "canceled",
            other => other,
        };
        Lane::ALL
            .iter()
            .copied()
            .find(|lane| lane.as_str() == canonical)
            .ok_or_else(|| MissionLogError::unknown_lane(raw))
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Lane::Done | Lane::Canceled)
    }
}

impl TryFrom<String> for Lane {
    type Error = MissionLogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Lane::normalize(&value)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mission audit verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditVerdict {
    Pass,
    PassWithWarnings,
    Fail,
    BlockedDecisionRequired,
}

/// Severity of audit findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Result of an automatically completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Success,
    Failed,
    Skipped,
}

/// Whether a participant intends to drive the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveIntent {
    Active,
    Inactive,
}

/// Glossary enforcement level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Off,
    #[default]
    Medium,
    Max,
}

/// Outcome of a semantic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Pass,
    Warn,
    Block,
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WpStatusChanged {
    pub feature_slug: String,
    pub wp_id: String,
    pub from_lane: Lane,
    pub to_lane: Lane,
    pub actor: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// Set by a reviewer sending work back
    #[serde(default)]
    pub review_ref: Option<String>,
    #[serde(default)]
    pub execution_mode: Option<String>,
}

// =============================================================================
// Lifecycle
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionCreated {
    pub mission_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionStarted {
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEntered {
    pub phase: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionPaused {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionResumed {
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionCompleted {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionCancelled {
    #[serde(default)]
    pub reason: Option<String>,
}

// =============================================================================
// Mission audit
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionAuditRequested {
    #[serde(default)]
    pub trigger_mode: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionAuditStarted {
    #[serde(default)]
    pub audit_scope: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionAuditDecisionRequested {
    pub decision_id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionAuditCompleted {
    pub verdict: AuditVerdict,
    #[serde(default)]
    pub severity: Option<AuditSeverity>,
    #[serde(default)]
    pub findings_count: u32,
    #[serde(default)]
    pub artifact_ref: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionAuditFailed {
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub partial_artifact_ref: Option<String>,
}

// =============================================================================
// Decision points
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPointOpened {
    pub decision_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub authority_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPointDiscussing {
    pub decision_id: String,
    #[serde(default)]
    pub participant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPointResolved {
    pub decision_id: String,
    pub chosen_option: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPointOverridden {
    pub decision_id: String,
    pub chosen_option: String,
    #[serde(default)]
    pub overridden_by: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// =============================================================================
// Connectors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorProvisioned {
    pub connector_id: String,
    pub provider: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorHealthChecked {
    pub connector_id: String,
    pub healthy: bool,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDegraded {
    pub connector_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRecovered {
    pub connector_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRevoked {
    pub connector_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDecommissioned {
    pub connector_id: String,
}

// =============================================================================
// Sync
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIngestAccepted {
    pub delivery_id: String,
    #[serde(default)]
    pub batch_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIngestRejected {
    pub delivery_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRetryScheduled {
    pub delivery_id: String,
    pub attempt: u32,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDeadLettered {
    pub delivery_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub attempts: u32,
}

// =============================================================================
// Mission next
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRunStarted {
    pub mission_type: String,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStepIssued {
    pub step_id: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStepAutoCompleted {
    pub step_id: String,
    pub result: StepResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInputRequested {
    pub decision_id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInputAnswered {
    pub decision_id: String,
    pub answer: String,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionRunCompleted {
    #[serde(default)]
    pub outcome: Option<String>,
}

// =============================================================================
// Collaboration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInvited {
    pub participant_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantJoined {
    pub participant_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantLeft {
    pub participant_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveIntentSet {
    pub participant_id: String,
    pub intent: DriveIntent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusChanged {
    pub participant_id: String,
    pub focus_target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPosted {
    pub participant_id: String,
    pub comment_id: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningRaised {
    pub warning_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningAcknowledged {
    pub warning_id: String,
    pub participant_id: String,
}

// =============================================================================
// Glossary
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryScopeActivated {
    pub scope_id: String,
    #[serde(default)]
    pub scope_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryStrictnessSet {
    pub mode: Strictness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermCandidateObserved {
    pub term: String,
    pub scope_id: String,
    #[serde(default)]
    pub source_step: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossarySenseUpdated {
    pub term: String,
    pub scope_id: String,
    pub sense_id: String,
    #[serde(default)]
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryClarificationRequested {
    pub clarification_id: String,
    pub term: String,
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryClarificationResolved {
    pub clarification_id: String,
    #[serde(default)]
    pub sense_id: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCheckEvaluated {
    pub check_id: String,
    pub outcome: CheckOutcome,
    #[serde(default)]
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationBlockedBySemanticConflict {
    pub step_id: String,
    #[serde(default)]
    pub conflicting_terms: Vec<String>,
}

// =============================================================================
// Dispatch table
// =============================================================================

macro_rules! payload_table {
    ($( $variant:ident ),+ $(,)?) => {
        /// Decoded payload for one catalog event.
        #[derive(Debug, Clone, PartialEq)]
        pub enum DomainPayload {
            $( $variant($variant), )+
        }

        impl DomainPayload {
            /// Decode a raw payload for a known kind.
            ///
            /// The match is exhaustive over [`EventKind`]; adding a kind
            /// without a decoder does not compile.
            pub fn decode(kind: EventKind, value: &serde_json::Value) -> serde_json::Result<Self> {
                match kind {
                    $( EventKind::$variant => {
                        <$variant as Deserialize>::deserialize(value).map(DomainPayload::$variant)
                    } )+
                }
            }

            pub fn kind(&self) -> EventKind {
                match self {
                    $( DomainPayload::$variant(_) => EventKind::$variant, )+
                }
            }

            /// Re-encode the payload as JSON.
            pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
                match self {
                    $( DomainPayload::$variant(payload) => serde_json::to_value(payload), )+
                }
            }
        }
    };
}

payload_table! {
    WpStatusChanged,
    MissionCreated,
    MissionStarted,
    PhaseEntered,
    MissionPaused,
    MissionResumed,
    MissionCompleted,
    MissionCancelled,
    MissionAuditRequested,
    MissionAuditStarted,
    MissionAuditDecisionRequested,
    MissionAuditCompleted,
    MissionAuditFailed,
    DecisionPointOpened,
    DecisionPointDiscussing,
    DecisionPointResolved,
    DecisionPointOverridden,
    ConnectorProvisioned,
    ConnectorHealthChecked,
    ConnectorDegraded,
    ConnectorRecovered,
    ConnectorRevoked,
    ConnectorDecommissioned,
    SyncIngestAccepted,
    SyncIngestRejected,
    SyncRetryScheduled,
    SyncDeadLettered,
    MissionRunStarted,
    NextStepIssued,
    NextStepAutoCompleted,
    DecisionInputRequested,
    DecisionInputAnswered,
    MissionRunCompleted,
    ParticipantInvited,
    ParticipantJoined,
    ParticipantLeft,
    DriveIntentSet,
    FocusChanged,
    CommentPosted,
    WarningRaised,
    WarningAcknowledged,
    GlossaryScopeActivated,
    GlossaryStrictnessSet,
    TermCandidateObserved,
    GlossarySenseUpdated,
    GlossaryClarificationRequested,
    GlossaryClarificationResolved,
    SemanticCheckEvaluated,
    GenerationBlockedBySemanticConflict,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_lane_aliases_normalize() {
        assert_eq!(Lane::normalize("doing").unwrap(), Lane::InProgress);
        assert_eq!(Lane::normalize("Cancelled").unwrap(), Lane::Canceled);
        assert_eq!(Lane::normalize("for-review").unwrap(), Lane::ForReview);
    }

    #[test]
    fn test_unknown_lane_is_validation_error() {
        let err = Lane::normalize("archived").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownLane);
    }

    #[test]
    fn test_lane_serializes_canonically() {
        let lane: Lane = serde_json::from_value(json!("doing")).unwrap();
        assert_eq!(serde_json::to_value(lane).unwrap(), json!("in_progress"));
    }

    #[test]
    fn test_decode_status_change_with_alias() {
        let payload = DomainPayload::decode(
            EventKind::WpStatusChanged,
            &json!({
                "feature_slug": "042-feature",
                "wp_id": "WP01",
                "from_lane": "claimed",
                "to_lane": "doing",
                "actor": "agent-1"
            }),
        )
        .unwrap();

        match payload {
            DomainPayload::WpStatusChanged(change) => {
                assert_eq!(change.to_lane, Lane::InProgress);
                assert!(!change.force);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_verdict() {
        let result = DomainPayload::decode(
            EventKind::MissionAuditCompleted,
            &json!({"verdict": "meh"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_every_kind_has_a_matching_variant() {
        let payload = DomainPayload::decode(EventKind::MissionResumed, &json!({})).unwrap();
        assert_eq!(payload.kind(), EventKind::MissionResumed);
        assert_eq!(payload.to_value().unwrap(), json!({"actor": null}));
    }
}
