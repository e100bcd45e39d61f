//! Mission-next run reducer.
//!
//! `running ⇄ waiting_input → completed`. A `DecisionInputRequested` opens a
//! pending decision; the `DecisionInputAnswered` with the same id closes it.

use serde::{Deserialize, Serialize};

use super::{Anomaly, AnomalyKind, AnomalyLog, PendingDecision, Projection, ReductionSummary};
use crate::events::payload::StepResult;
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::MissionRunStarted,
    EventKind::NextStepIssued,
    EventKind::NextStepAutoCompleted,
    EventKind::DecisionInputRequested,
    EventKind::DecisionInputAnswered,
    EventKind::MissionRunCompleted,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    WaitingInput,
    Completed,
}

impl RunStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::WaitingInput => "waiting_input",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedStep {
    pub step_id: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step_id: String,
    pub result: StepResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredDecision {
    pub decision_id: String,
    pub answer: String,
    pub actor: Option<String>,
}

/// Frozen state of one mission-next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionNextState {
    pub run_id: Option<String>,
    pub status: Option<RunStatus>,
    pub mission_type: Option<String>,
    pub current_step: Option<IssuedStep>,
    pub completed_steps: Vec<CompletedStep>,
    pub pending_decisions: Vec<PendingDecision>,
    pub answered_decisions: Vec<AnsweredDecision>,
    pub outcome: Option<String>,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

#[derive(Debug, Default)]
struct MissionNextProjection {
    run_id: Option<String>,
    status: Option<RunStatus>,
    mission_type: Option<String>,
    current_step: Option<IssuedStep>,
    completed_steps: Vec<CompletedStep>,
    pending: Vec<PendingDecision>,
    answered: Vec<AnsweredDecision>,
    outcome: Option<String>,
}

impl MissionNextProjection {
    fn settle_status(&mut self) {
        if self.status != Some(RunStatus::Completed) {
            self.status = Some(if self.pending.is_empty() {
                RunStatus::Running
            } else {
                RunStatus::WaitingInput
            });
        }
    }
}

impl Projection for MissionNextProjection {
    type Snapshot = MissionNextState;

    const DOMAIN: Domain = Domain::MissionNext;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        if self.run_id.is_none() {
            self.run_id = Some(event.aggregate_id.clone());
        }

        match self.status {
            Some(RunStatus::Completed) => {
                anomalies.record(
                    AnomalyKind::EventAfterTerminal,
                    event,
                    format!("{} after the run completed", event.event_type),
                );
                return;
            }
            None if !matches!(payload, DomainPayload::MissionRunStarted(_)) => {
                anomalies.record(
                    AnomalyKind::EventBeforeRunStarted,
                    event,
                    format!("{} before MissionRunStarted", event.event_type),
                );
            }
            _ => {}
        }

        match payload {
            DomainPayload::MissionRunStarted(started) => {
                if self.status.is_some() {
                    anomalies.record(
                        AnomalyKind::DuplicateStart,
                        event,
                        "MissionRunStarted on a run already started",
                    );
                    return;
                }
                self.mission_type = Some(started.mission_type.clone());
            }
            DomainPayload::NextStepIssued(issued) => {
                self.current_step = Some(IssuedStep {
                    step_id: issued.step_id.clone(),
                    action: issued.action.clone(),
                });
            }
            DomainPayload::NextStepAutoCompleted(completed) => {
                let matches_current = self
                    .current_step
                    .as_ref()
                    .is_some_and(|step| step.step_id == completed.step_id);
                if matches_current {
                    self.current_step = None;
                } else {
                    anomalies.record(
                        AnomalyKind::StepMismatch,
                        event,
                        format!("Step {} completed but was not the current step", completed.step_id),
                    );
                }
                self.completed_steps.push(CompletedStep {
                    step_id: completed.step_id.clone(),
                    result: completed.result,
                });
            }
            DomainPayload::DecisionInputRequested(request) => {
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
            }
            DomainPayload::DecisionInputAnswered(answer) => {
                let Some(index) = self
                    .pending
                    .iter()
                    .position(|d| d.decision_id == answer.decision_id)
                else {
                    anomalies.record(
                        AnomalyKind::UnknownDecision,
                        event,
                        format!("Answer for unknown decision {}", answer.decision_id),
                    );
                    return;
                };
                let decision = self.pending.remove(index);
                if !decision.accepts(&answer.answer) {
                    anomalies.record(
                        AnomalyKind::InvalidOption,
                        event,
                        format!(
                            "'{}' is not an option of decision {}",
                            answer.answer, decision.decision_id
                        ),
                    );
                }
                self.answered.push(AnsweredDecision {
                    decision_id: decision.decision_id,
                    answer: answer.answer.clone(),
                    actor: answer.actor.clone(),
                });
            }
            DomainPayload::MissionRunCompleted(completed) => {
                self.status = Some(RunStatus::Completed);
                self.outcome = completed.outcome.clone();
                self.pending.clear();
                self.current_step = None;
                return;
            }
            _ => {}
        }
        self.settle_status();
    }

    fn freeze(self, summary: ReductionSummary) -> MissionNextState {
        MissionNextState {
            run_id: self.run_id,
            status: self.status,
            mission_type: self.mission_type,
            current_step: self.current_step,
            completed_steps: self.completed_steps,
            pending_decisions: self.pending,
            answered_decisions: self.answered,
            outcome: self.outcome,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

/// Reduce mission-next events for one run.
pub fn reduce_mission_next_events<'a, I>(events: I) -> MissionNextState
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<MissionNextProjection, _>(events)
}
