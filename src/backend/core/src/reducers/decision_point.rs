//! Decision point reducer.
//!
//! Per decision: `open → discussing → resolved → overridden`. Overridden is
//! terminal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Anomaly, AnomalyKind, AnomalyLog, Projection, ReductionSummary};
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};
use crate::merge::GSet;

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::DecisionPointOpened,
    EventKind::DecisionPointDiscussing,
    EventKind::DecisionPointResolved,
    EventKind::DecisionPointOverridden,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Open,
    Discussing,
    Resolved,
    Overridden,
}

impl DecisionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Discussing => "discussing",
            Self::Resolved => "resolved",
            Self::Overridden => "overridden",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: String,
    pub title: String,
    pub options: Vec<String>,
    pub authority_role: Option<String>,
    pub status: DecisionStatus,
    pub participants: GSet<String>,
    pub chosen_option: Option<String>,
    pub rationale: Option<String>,
    pub resolved_by: Option<String>,
    pub overridden_by: Option<String>,
    pub override_reason: Option<String>,
}

impl DecisionRecord {
    fn new(decision_id: &str, status: DecisionStatus) -> Self {
        Self {
            decision_id: decision_id.to_string(),
            title: String::new(),
            options: Vec::new(),
            authority_role: None,
            status,
            participants: GSet::new(),
            chosen_option: None,
            rationale: None,
            resolved_by: None,
            overridden_by: None,
            override_reason: None,
        }
    }

    fn accepts(&self, option: &str) -> bool {
        self.options.is_empty() || self.options.iter().any(|o| o == option)
    }
}

/// Frozen state of every decision point seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPointSnapshot {
    pub decisions: BTreeMap<String, DecisionRecord>,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

impl DecisionPointSnapshot {
    /// Decisions not yet resolved, by id.
    pub fn unresolved(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.decisions
            .values()
            .filter(|d| matches!(d.status, DecisionStatus::Open | DecisionStatus::Discussing))
    }
}

#[derive(Debug, Default)]
struct DecisionPointProjection {
    decisions: BTreeMap<String, DecisionRecord>,
}

impl DecisionPointProjection {
    /// The decision record, created best-effort when never opened.
    fn record_for(
        &mut self,
        decision_id: &str,
        event: &Event,
        anomalies: &mut AnomalyLog,
    ) -> &mut DecisionRecord {
        if !self.decisions.contains_key(decision_id) {
            anomalies.record(
                AnomalyKind::EventBeforeOpened,
                event,
                format!("{} for unopened decision {}", event.event_type, decision_id),
            );
        }
        self.decisions
            .entry(decision_id.to_string())
            .or_insert_with(|| DecisionRecord::new(decision_id, DecisionStatus::Open))
    }
}

fn check_option(record: &DecisionRecord, option: &str, event: &Event, anomalies: &mut AnomalyLog) {
    if !record.accepts(option) {
        anomalies.record(
            AnomalyKind::InvalidOption,
            event,
            format!(
                "'{}' is not an option of decision {}",
                option, record.decision_id
            ),
        );
    }
}

impl Projection for DecisionPointProjection {
    type Snapshot = DecisionPointSnapshot;

    const DOMAIN: Domain = Domain::DecisionPoint;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        match payload {
            DomainPayload::DecisionPointOpened(opened) => {
                if self.decisions.contains_key(&opened.decision_id) {
                    anomalies.record(
                        AnomalyKind::DuplicateDecisionId,
                        event,
                        format!("Decision {} opened twice", opened.decision_id),
                    );
                    return;
                }
                let mut record = DecisionRecord::new(&opened.decision_id, DecisionStatus::Open);
                record.title = opened.title.clone();
                record.options = opened.options.clone();
                record.authority_role = opened.authority_role.clone();
                self.decisions.insert(opened.decision_id.clone(), record);
            }
            DomainPayload::DecisionPointDiscussing(discussing) => {
                let record = self.record_for(&discussing.decision_id, event, anomalies);
                match record.status {
                    DecisionStatus::Overridden => {
                        anomalies.record(
                            AnomalyKind::EventAfterTerminal,
                            event,
                            format!("Decision {} already overridden", record.decision_id),
                        );
                        return;
                    }
                    DecisionStatus::Resolved => anomalies.record(
                        AnomalyKind::InvalidTransition,
                        event,
                        format!("Decision {} discussed after resolution", record.decision_id),
                    ),
                    DecisionStatus::Open | DecisionStatus::Discussing => {
                        record.status = DecisionStatus::Discussing;
                    }
                }
                if let Some(participant) = &discussing.participant {
                    record.participants.insert(participant.clone());
                }
            }
            DomainPayload::DecisionPointResolved(resolved) => {
                let record = self.record_for(&resolved.decision_id, event, anomalies);
                match record.status {
                    DecisionStatus::Overridden => anomalies.record(
                        AnomalyKind::EventAfterTerminal,
                        event,
                        format!("Decision {} already overridden", record.decision_id),
                    ),
                    DecisionStatus::Resolved => anomalies.record(
                        AnomalyKind::InvalidTransition,
                        event,
                        format!("Decision {} resolved twice", record.decision_id),
                    ),
                    DecisionStatus::Open | DecisionStatus::Discussing => {
                        check_option(record, &resolved.chosen_option, event, anomalies);
                        record.status = DecisionStatus::Resolved;
                        record.chosen_option = Some(resolved.chosen_option.clone());
                        record.rationale = resolved.rationale.clone();
                        record.resolved_by = resolved.resolved_by.clone();
                    }
                }
            }
            DomainPayload::DecisionPointOverridden(overridden) => {
                let record = self.record_for(&overridden.decision_id, event, anomalies);
                match record.status {
                    DecisionStatus::Overridden => {
                        anomalies.record(
                            AnomalyKind::EventAfterTerminal,
                            event,
                            format!("Decision {} already overridden", record.decision_id),
                        );
                        return;
                    }
                    DecisionStatus::Open | DecisionStatus::Discussing => anomalies.record(
                        AnomalyKind::InvalidTransition,
                        event,
                        format!(
                            "Decision {} overridden before resolution",
                            record.decision_id
                        ),
                    ),
                    DecisionStatus::Resolved => {}
                }
                check_option(record, &overridden.chosen_option, event, anomalies);
                record.status = DecisionStatus::Overridden;
                record.chosen_option = Some(overridden.chosen_option.clone());
                record.overridden_by = overridden.overridden_by.clone();
                record.override_reason = overridden.reason.clone();
            }
            _ => {}
        }
    }

    fn freeze(self, summary: ReductionSummary) -> DecisionPointSnapshot {
        DecisionPointSnapshot {
            decisions: self.decisions,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

/// Reduce decision point events into per-decision records.
pub fn reduce_decision_point_events<'a, I>(events: I) -> DecisionPointSnapshot
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<DecisionPointProjection, _>(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, clock: u64, event_type: &str, payload: serde_json::Value) -> Event {
        Event::builder(event_type, "mission-1")
            .with_event_id(id)
            .with_node("n")
            .lamport_clock(clock)
            .with_payload_value(payload)
            .build()
    }

    fn kinds(snapshot: &DecisionPointSnapshot) -> Vec<AnomalyKind> {
        snapshot.anomalies.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn test_open_discuss_resolve_override() {
        let events = vec![
            event(
                "e1",
                1,
                "DecisionPointOpened",
                json!({"decision_id": "dp1", "title": "DB?", "options": ["pg", "sqlite"]}),
            ),
            event("e2", 2, "DecisionPointDiscussing", json!({"decision_id": "dp1", "participant": "ana"})),
            event(
                "e3",
                3,
                "DecisionPointResolved",
                json!({"decision_id": "dp1", "chosen_option": "pg", "resolved_by": "ana"}),
            ),
            event(
                "e4",
                4,
                "DecisionPointOverridden",
                json!({"decision_id": "dp1", "chosen_option": "sqlite", "reason": "budget"}),
            ),
        ];
        let snapshot = reduce_decision_point_events(&events);
        let record = &snapshot.decisions["dp1"];

        assert_eq!(record.status, DecisionStatus::Overridden);
        assert_eq!(record.chosen_option.as_deref(), Some("sqlite"));
        assert!(record.participants.contains(&"ana".to_string()));
        assert!(snapshot.anomalies.is_empty());
        assert_eq!(snapshot.unresolved().count(), 0);
    }

    #[test]
    fn test_resolve_before_open_and_bad_option() {
        let events = vec![
            event(
                "e1",
                1,
                "DecisionPointOpened",
                json!({"decision_id": "dp1", "options": ["a", "b"]}),
            ),
            event("e2", 2, "DecisionPointResolved", json!({"decision_id": "dp1", "chosen_option": "c"})),
            event("e3", 3, "DecisionPointResolved", json!({"decision_id": "dp2", "chosen_option": "x"})),
        ];
        let snapshot = reduce_decision_point_events(&events);

        assert_eq!(
            kinds(&snapshot),
            vec![AnomalyKind::InvalidOption, AnomalyKind::EventBeforeOpened]
        );
        assert_eq!(snapshot.decisions["dp2"].status, DecisionStatus::Resolved);
    }

    #[test]
    fn test_duplicate_open_and_override_before_resolution() {
        let events = vec![
            event("e1", 1, "DecisionPointOpened", json!({"decision_id": "dp1"})),
            event("e2", 2, "DecisionPointOpened", json!({"decision_id": "dp1"})),
            event("e3", 3, "DecisionPointOverridden", json!({"decision_id": "dp1", "chosen_option": "z"})),
            event("e4", 4, "DecisionPointDiscussing", json!({"decision_id": "dp1"})),
        ];
        let snapshot = reduce_decision_point_events(&events);

        assert_eq!(
            kinds(&snapshot),
            vec![
                AnomalyKind::DuplicateDecisionId,
                AnomalyKind::InvalidTransition,
                AnomalyKind::EventAfterTerminal
            ]
        );
        assert_eq!(snapshot.decisions["dp1"].status, DecisionStatus::Overridden);
    }
}
