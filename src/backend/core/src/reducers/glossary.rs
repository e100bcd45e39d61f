//! Glossary reducer.
//!
//! Terms are keyed per scope by their lowercase form. Observations and senses
//! recorded against a scope that was never activated are kept but flagged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Anomaly, AnomalyKind, AnomalyLog, Projection, ReductionSummary};
use crate::events::payload::{CheckOutcome, Strictness};
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};
use crate::merge::GSet;

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::GlossaryScopeActivated,
    EventKind::GlossaryStrictnessSet,
    EventKind::TermCandidateObserved,
    EventKind::GlossarySenseUpdated,
    EventKind::GlossaryClarificationRequested,
    EventKind::GlossaryClarificationResolved,
    EventKind::SemanticCheckEvaluated,
    EventKind::GenerationBlockedBySemanticConflict,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    /// Spelling as first observed
    pub term: String,
    pub observations: usize,
    pub source_steps: GSet<String>,
    /// sense_id -> definition, latest update wins
    pub senses: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub clarification_id: String,
    pub term: String,
    pub question: String,
    pub sense_id: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTally {
    pub pass: usize,
    pub warn: usize,
    pub block: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedGeneration {
    pub step_id: String,
    pub conflicting_terms: Vec<String>,
    pub event_id: EventId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryState {
    /// scope_id -> scope_type
    pub active_scopes: BTreeMap<String, Option<String>>,
    pub strictness: Strictness,
    /// scope_id -> lowercase term -> entry
    pub terms: BTreeMap<String, BTreeMap<String, TermEntry>>,
    pub pending_clarifications: BTreeMap<String, Clarification>,
    pub resolved_clarifications: BTreeMap<String, Clarification>,
    pub checks: CheckTally,
    pub blocked_generations: Vec<BlockedGeneration>,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

impl GlossaryState {
    /// Look up a term in a scope, case-insensitively.
    pub fn term(&self, scope_id: &str, term: &str) -> Option<&TermEntry> {
        self.terms
            .get(scope_id)
            .and_then(|terms| terms.get(&term.to_lowercase()))
    }

    /// Whether generation should currently be refused.
    pub fn is_blocked(&self) -> bool {
        self.strictness != Strictness::Off
            && (!self.pending_clarifications.is_empty() || !self.blocked_generations.is_empty())
    }
}

#[derive(Debug, Default)]
struct GlossaryProjection {
    active_scopes: BTreeMap<String, Option<String>>,
    strictness: Strictness,
    terms: BTreeMap<String, BTreeMap<String, TermEntry>>,
    pending: BTreeMap<String, Clarification>,
    resolved: BTreeMap<String, Clarification>,
    checks: CheckTally,
    blocked: Vec<BlockedGeneration>,
}

impl GlossaryProjection {
    fn term_entry(
        &mut self,
        scope_id: &str,
        term: &str,
        event: &Event,
        anomalies: &mut AnomalyLog,
    ) -> &mut TermEntry {
        if !self.active_scopes.contains_key(scope_id) {
            anomalies.record(
                AnomalyKind::ScopeNotActive,
                event,
                format!("{} in inactive scope {}", event.event_type, scope_id),
            );
        }
        self.terms
            .entry(scope_id.to_string())
            .or_default()
            .entry(term.to_lowercase())
            .or_insert_with(|| TermEntry {
                term: term.to_string(),
                ..TermEntry::default()
            })
    }
}

impl Projection for GlossaryProjection {
    type Snapshot = GlossaryState;

    const DOMAIN: Domain = Domain::Glossary;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        match payload {
            DomainPayload::GlossaryScopeActivated(scope) => {
                self.active_scopes
                    .insert(scope.scope_id.clone(), scope.scope_type.clone());
            }
            DomainPayload::GlossaryStrictnessSet(set) => {
                self.strictness = set.mode;
            }
            DomainPayload::TermCandidateObserved(observed) => {
                let entry = self.term_entry(&observed.scope_id, &observed.term, event, anomalies);
                entry.observations += 1;
                if let Some(step) = &observed.source_step {
                    entry.source_steps.insert(step.clone());
                }
            }
            DomainPayload::GlossarySenseUpdated(sense) => {
                let entry = self.term_entry(&sense.scope_id, &sense.term, event, anomalies);
                entry
                    .senses
                    .insert(sense.sense_id.clone(), sense.definition.clone());
            }
            DomainPayload::GlossaryClarificationRequested(request) => {
                let id = &request.clarification_id;
                if self.pending.contains_key(id) || self.resolved.contains_key(id) {
                    anomalies.record(
                        AnomalyKind::DuplicateClarificationId,
                        event,
                        format!("Clarification {} requested twice", id),
                    );
                    return;
                }
                self.pending.insert(
                    id.clone(),
                    Clarification {
                        clarification_id: id.clone(),
                        term: request.term.clone(),
                        question: request.question.clone(),
                        sense_id: None,
                        answer: None,
                    },
                );
            }
            DomainPayload::GlossaryClarificationResolved(resolution) => {
                let Some(mut clarification) = self.pending.remove(&resolution.clarification_id)
                else {
                    anomalies.record(
                        AnomalyKind::UnknownClarification,
                        event,
                        format!(
                            "Resolution for unknown or settled clarification {}",
                            resolution.clarification_id
                        ),
                    );
                    return;
                };
                clarification.sense_id = resolution.sense_id.clone();
                clarification.answer = resolution.answer.clone();
                self.resolved
                    .insert(clarification.clarification_id.clone(), clarification);
            }
            DomainPayload::SemanticCheckEvaluated(check) => match check.outcome {
                CheckOutcome::Pass => self.checks.pass += 1,
                CheckOutcome::Warn => self.checks.warn += 1,
                CheckOutcome::Block => self.checks.block += 1,
            },
            DomainPayload::GenerationBlockedBySemanticConflict(blocked) => {
                self.blocked.push(BlockedGeneration {
                    step_id: blocked.step_id.clone(),
                    conflicting_terms: blocked.conflicting_terms.clone(),
                    event_id: event.event_id.clone(),
                });
            }
            _ => {}
        }
    }

    fn freeze(self, summary: ReductionSummary) -> GlossaryState {
        GlossaryState {
            active_scopes: self.active_scopes,
            strictness: self.strictness,
            terms: self.terms,
            pending_clarifications: self.pending,
            resolved_clarifications: self.resolved,
            checks: self.checks,
            blocked_generations: self.blocked,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

pub fn reduce_glossary_events<'a, I>(events: I) -> GlossaryState
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<GlossaryProjection, _>(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, clock: u64, event_type: &str, payload: serde_json::Value) -> Event {
        Event::builder(event_type, "glossary")
            .with_event_id(id)
            .with_node("n")
            .lamport_clock(clock)
            .with_payload_value(payload)
            .build()
    }

    #[test]
    fn test_terms_and_senses() {
        let events = vec![
            event("e1", 1, "GlossaryScopeActivated", json!({"scope_id": "team", "scope_type": "team_domain"})),
            event("e2", 2, "TermCandidateObserved", json!({"term": "Lane", "scope_id": "team", "source_step": "s1"})),
            event("e3", 3, "TermCandidateObserved", json!({"term": "lane", "scope_id": "team", "source_step": "s2"})),
            event(
                "e4",
                4,
                "GlossarySenseUpdated",
                json!({"term": "LANE", "scope_id": "team", "sense_id": "k1", "definition": "kanban column"}),
            ),
        ];
        let state = reduce_glossary_events(&events);
        let lane = state.term("team", "lane").unwrap();

        assert_eq!(lane.term, "Lane");
        assert_eq!(lane.observations, 2);
        assert_eq!(lane.source_steps.len(), 2);
        assert_eq!(lane.senses["k1"], "kanban column");
        assert_eq!(state.strictness, Strictness::Medium);
        assert!(state.anomalies.is_empty());
    }

    #[test]
    fn test_clarification_flow() {
        let events = vec![
            event("e1", 1, "GlossaryClarificationRequested", json!({"clarification_id": "c1", "term": "run"})),
            event("e2", 2, "GlossaryClarificationRequested", json!({"clarification_id": "c1", "term": "run"})),
            event("e3", 3, "GlossaryClarificationResolved", json!({"clarification_id": "c1", "sense_id": "r1"})),
            event("e4", 4, "GlossaryClarificationResolved", json!({"clarification_id": "c1"})),
        ];
        let state = reduce_glossary_events(&events);

        let kinds: Vec<_> = state.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AnomalyKind::DuplicateClarificationId, AnomalyKind::UnknownClarification]
        );
        assert!(state.pending_clarifications.is_empty());
        assert_eq!(state.resolved_clarifications["c1"].sense_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_checks_blocking_and_inactive_scope() {
        let events = vec![
            event("e1", 1, "GlossaryStrictnessSet", json!({"mode": "max"})),
            event("e2", 2, "SemanticCheckEvaluated", json!({"check_id": "k1", "outcome": "pass"})),
            event("e3", 3, "SemanticCheckEvaluated", json!({"check_id": "k2", "outcome": "block"})),
            event(
                "e4",
                4,
                "GenerationBlockedBySemanticConflict",
                json!({"step_id": "s3", "conflicting_terms": ["run"]}),
            ),
            event("e5", 5, "TermCandidateObserved", json!({"term": "run", "scope_id": "nowhere"})),
        ];
        let state = reduce_glossary_events(&events);

        assert_eq!(state.strictness, Strictness::Max);
        assert_eq!(state.checks, CheckTally { pass: 1, warn: 0, block: 1 });
        assert!(state.is_blocked());
        assert_eq!(state.anomalies[0].kind, AnomalyKind::ScopeNotActive);
    }
}
