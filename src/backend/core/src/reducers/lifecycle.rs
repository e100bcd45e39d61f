//! Mission lifecycle reducer.
//!
//! `created → active ⇄ paused → completed | cancelled`, plus a history of
//! entered phases.

use serde::{Deserialize, Serialize};

use super::{Anomaly, AnomalyKind, AnomalyLog, Projection, ReductionSummary};
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::MissionCreated,
    EventKind::MissionStarted,
    EventKind::PhaseEntered,
    EventKind::MissionPaused,
    EventKind::MissionResumed,
    EventKind::MissionCompleted,
    EventKind::MissionCancelled,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Created,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl MissionStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub event_id: EventId,
    pub lamport_clock: u64,
}

/// Frozen lifecycle of one mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionLifecycleState {
    pub mission_id: Option<String>,
    /// `None` until any lifecycle event is seen
    pub status: Option<MissionStatus>,
    pub mission_type: Option<String>,
    pub title: Option<String>,
    pub current_phase: Option<String>,
    pub phase_history: Vec<PhaseRecord>,
    pub pause_reason: Option<String>,
    pub outcome: Option<String>,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

#[derive(Debug, Default)]
struct LifecycleProjection {
    mission_id: Option<String>,
    status: Option<MissionStatus>,
    mission_type: Option<String>,
    title: Option<String>,
    current_phase: Option<String>,
    phase_history: Vec<PhaseRecord>,
    pause_reason: Option<String>,
    outcome: Option<String>,
}

impl LifecycleProjection {
    /// Shared guard for every event after creation. Returns `false` when the
    /// event must be ignored.
    fn admit(&self, event: &Event, anomalies: &mut AnomalyLog) -> bool {
        match self.status {
            None => {
                anomalies.record(
                    AnomalyKind::EventBeforeCreated,
                    event,
                    format!("{} before MissionCreated", event.event_type),
                );
                true
            }
            Some(status) if status.is_terminal() => {
                anomalies.record(
                    AnomalyKind::EventAfterTerminal,
                    event,
                    format!("{} after mission {}", event.event_type, status.as_str()),
                );
                false
            }
            Some(_) => true,
        }
    }

    /// Move to `to`, flagging the move when `from` is not one of `allowed`.
    fn transition(
        &mut self,
        event: &Event,
        allowed: &[MissionStatus],
        to: MissionStatus,
        anomalies: &mut AnomalyLog,
    ) {
        if let Some(current) = self.status {
            if !allowed.contains(&current) {
                anomalies.record(
                    AnomalyKind::InvalidTransition,
                    event,
                    format!("Mission cannot go {} -> {}", current.as_str(), to.as_str()),
                );
            }
        }
        self.status = Some(to);
    }
}

impl Projection for LifecycleProjection {
    type Snapshot = MissionLifecycleState;

    const DOMAIN: Domain = Domain::Lifecycle;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        use MissionStatus::*;

        if self.mission_id.is_none() {
            self.mission_id = Some(event.aggregate_id.clone());
        }

        if let DomainPayload::MissionCreated(created) = payload {
            if self.status.is_some() {
                anomalies.record(
                    AnomalyKind::DuplicateStart,
                    event,
                    "MissionCreated after the mission already exists",
                );
                return;
            }
            self.status = Some(Created);
            self.mission_type = Some(created.mission_type.clone());
            self.title = created.title.clone();
            return;
        }

        if !self.admit(event, anomalies) {
            return;
        }

        match payload {
            DomainPayload::MissionStarted(_) => match self.status {
                Some(Active | Paused) => anomalies.record(
                    AnomalyKind::DuplicateStart,
                    event,
                    "MissionStarted on a mission already started",
                ),
                _ => self.status = Some(Active),
            },
            DomainPayload::PhaseEntered(entered) => {
                self.current_phase = Some(entered.phase.clone());
                self.phase_history.push(PhaseRecord {
                    phase: entered.phase.clone(),
                    event_id: event.event_id.clone(),
                    lamport_clock: event.lamport_clock,
                });
            }
            DomainPayload::MissionPaused(paused) => {
                self.transition(event, &[Active], Paused, anomalies);
                self.pause_reason = paused.reason.clone();
            }
            DomainPayload::MissionResumed(_) => {
                self.transition(event, &[Paused], Active, anomalies);
                self.pause_reason = None;
            }
            DomainPayload::MissionCompleted(completed) => {
                self.transition(event, &[Active], Completed, anomalies);
                self.outcome = completed.summary.clone();
            }
            DomainPayload::MissionCancelled(cancelled) => {
                self.transition(event, &[Created, Active, Paused], Cancelled, anomalies);
                self.outcome = cancelled.reason.clone();
            }
            _ => {}
        }
    }

    fn freeze(self, summary: ReductionSummary) -> MissionLifecycleState {
        MissionLifecycleState {
            mission_id: self.mission_id,
            status: self.status,
            mission_type: self.mission_type,
            title: self.title,
            current_phase: self.current_phase,
            phase_history: self.phase_history,
            pause_reason: self.pause_reason,
            outcome: self.outcome,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

/// Reduce mission lifecycle events for one mission.
pub fn reduce_lifecycle_events<'a, I>(events: I) -> MissionLifecycleState
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<LifecycleProjection, _>(events)
}
