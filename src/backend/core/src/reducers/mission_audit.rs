//! Mission audit reducer.
//!
//! `pending → running → awaiting_decision → completed | failed`. Decision
//! requests add pending decisions; terminal events clear them.

use serde::{Deserialize, Serialize};

use super::{Anomaly, AnomalyKind, AnomalyLog, PendingDecision, Projection, ReductionSummary};
use crate::events::payload::{AuditSeverity, AuditVerdict};
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::MissionAuditRequested,
    EventKind::MissionAuditStarted,
    EventKind::MissionAuditDecisionRequested,
    EventKind::MissionAuditCompleted,
    EventKind::MissionAuditFailed,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    #[default]
    Pending,
    Running,
    AwaitingDecision,
    Completed,
    Failed,
}

impl AuditStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingDecision => "awaiting_decision",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFailure {
    pub error_code: String,
    pub error_message: String,
    pub partial_artifact_ref: Option<String>,
}

/// Frozen state of one mission audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionAuditState {
    pub audit_status: AuditStatus,
    pub trigger_mode: Option<String>,
    pub audit_scope: Vec<String>,
    pub verdict: Option<AuditVerdict>,
    pub severity: Option<AuditSeverity>,
    pub findings_count: u32,
    pub artifact_ref: Option<String>,
    pub summary: Option<String>,
    pub failure: Option<AuditFailure>,
    pub pending_decisions: Vec<PendingDecision>,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

#[derive(Debug, Default)]
struct AuditProjection {
    requested: bool,
    status: AuditStatus,
    trigger_mode: Option<String>,
    audit_scope: Vec<String>,
    verdict: Option<AuditVerdict>,
    severity: Option<AuditSeverity>,
    findings_count: u32,
    artifact_ref: Option<String>,
    summary: Option<String>,
    failure: Option<AuditFailure>,
    pending: Vec<PendingDecision>,
}

impl AuditProjection {
    fn require_requested(&mut self, event: &Event, anomalies: &mut AnomalyLog) {
        if !self.requested {
            anomalies.record(
                AnomalyKind::EventBeforeRequested,
                event,
                format!("{} without a prior MissionAuditRequested", event.event_type),
            );
            // Reported once per audit.
            self.requested = true;
        }
    }
}

impl Projection for AuditProjection {
    type Snapshot = MissionAuditState;

    const DOMAIN: Domain = Domain::MissionAudit;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        if self.status.is_terminal() {
            anomalies.record(
                AnomalyKind::EventAfterTerminal,
                event,
                format!("{} after audit {}", event.event_type, self.status.as_str()),
            );
            return;
        }

        match payload {
            DomainPayload::MissionAuditRequested(requested) => {
                if self.requested {
                    anomalies.record(
                        AnomalyKind::DuplicateStart,
                        event,
                        "Audit already requested",
                    );
                    return;
                }
                self.requested = true;
                self.trigger_mode = requested.trigger_mode.clone();
            }
            DomainPayload::MissionAuditStarted(started) => {
                self.require_requested(event, anomalies);
                if self.status != AuditStatus::Pending {
                    anomalies.record(
                        AnomalyKind::DuplicateStart,
                        event,
                        format!("Audit already {}", self.status.as_str()),
                    );
                    return;
                }
                self.status = AuditStatus::Running;
                self.audit_scope = started.audit_scope.clone();
            }
            DomainPayload::MissionAuditDecisionRequested(request) => {
                self.require_requested(event, anomalies);
                if self.pending.iter().any(|d| d.decision_id == request.decision_id) {
                    anomalies.record(
                        AnomalyKind::DuplicateDecisionId,
                        event,
                        format!("Decision {} is already pending", request.decision_id),
                    );
                    return;
                }
                self.pending.push(PendingDecision {
                    decision_id: request.decision_id.clone(),
                    question: request.question.clone(),
                    options: request.options.clone(),
                    requested_by: event.event_id.clone(),
                });
                self.status = AuditStatus::AwaitingDecision;
            }
            DomainPayload::MissionAuditCompleted(completed) => {
                if self.requested && self.status == AuditStatus::Pending {
                    anomalies.record(
                        AnomalyKind::InvalidTransition,
                        event,
                        "Audit completed before it started",
                    );
                }
                self.require_requested(event, anomalies);
                self.status = AuditStatus::Completed;
                self.verdict = Some(completed.verdict);
                self.severity = completed.severity;
                self.findings_count = completed.findings_count;
                self.artifact_ref = completed.artifact_ref.clone();
                self.summary = completed.summary.clone();
                self.pending.clear();
            }
            DomainPayload::MissionAuditFailed(failed) => {
                self.require_requested(event, anomalies);
                self.status = AuditStatus::Failed;
                self.failure = Some(AuditFailure {
                    error_code: failed.error_code.clone(),
                    error_message: failed.error_message.clone(),
                    partial_artifact_ref: failed.partial_artifact_ref.clone(),
                });
                self.pending.clear();
            }
            _ => {}
        }
    }

    fn freeze(self, summary: ReductionSummary) -> MissionAuditState {
        MissionAuditState {
            audit_status: self.status,
            trigger_mode: self.trigger_mode,
            audit_scope: self.audit_scope,
            verdict: self.verdict,
            severity: self.severity,
            findings_count: self.findings_count,
            artifact_ref: self.artifact_ref,
            summary: self.summary,
            failure: self.failure,
            pending_decisions: self.pending,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

/// Reduce mission audit events for one audit run.
pub fn reduce_mission_audit_events<'a, I>(events: I) -> MissionAuditState
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<AuditProjection, _>(events)
}
