//! Deterministic domain reducers.
//!
//! Every reducer runs the same pipeline over a finite event set:
//!
//! 1. canonicalize (sort by [`OrderKey`], dedup by `event_id`)
//! 2. filter to the domain's `EVENT_TYPES`
//! 3. decode each payload through the closed dispatch table
//! 4. fold left to right through [`Projection::apply`]
//! 5. freeze into an immutable snapshot
//!
//! Reduction is a total function. Semantically inconsistent history is
//! recorded as [`Anomaly`] data and never raised.
//!
//! [`OrderKey`]: crate::ordering::OrderKey

pub mod anomaly;
pub mod collaboration;
pub mod connector;
pub mod decision_point;
pub mod glossary;
pub mod lifecycle;
pub mod mission_audit;
pub mod mission_next;
pub mod status;
pub mod sync;

pub use anomaly::{Anomaly, AnomalyKind, AnomalyLog};
pub use collaboration::{reduce_collaboration_events, CollaborationState};
pub use connector::{reduce_connector_events, ConnectorSnapshot};
pub use decision_point::{reduce_decision_point_events, DecisionPointSnapshot};
pub use glossary::{reduce_glossary_events, GlossaryState};
pub use lifecycle::{reduce_lifecycle_events, MissionLifecycleState};
pub use mission_audit::{reduce_mission_audit_events, MissionAuditState};
pub use mission_next::{reduce_mission_next_events, MissionNextState};
pub use status::{reduce_status_events, StatusSnapshot};
pub use sync::{reduce_sync_events, SyncSnapshot};

use serde::{Deserialize, Serialize};

use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};
use crate::ordering::canonicalize;
use crate::telemetry::metrics::ReductionMetrics;

// =============================================================================
// Projection Trait
// =============================================================================

/// A domain state machine that can be folded from canonical events.
///
/// A projection starts at its `Default` state, sees each relevant event once
/// in canonical order, and is then frozen into its snapshot type.
/// Implementations must be pure: no I/O, no failure.
pub trait Projection: Default {
    /// Frozen result of a reduction.
    type Snapshot;

    const DOMAIN: Domain;

    /// Event kinds this projection folds.
    const EVENT_TYPES: &'static [EventKind];

    /// Inspect the whole decoded sequence before folding.
    fn prepare(&mut self, _events: &[(&Event, &DomainPayload)]) {}

    /// Fold one event.
    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog);

    fn freeze(self, summary: ReductionSummary) -> Self::Snapshot;
}

/// Bookkeeping every snapshot carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionSummary {
    /// Deduplicated, filtered events folded
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

/// An unresolved question awaiting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub decision_id: String,
    pub question: String,
    pub options: Vec<String>,
    /// Event that opened the decision
    pub requested_by: EventId,
}

impl PendingDecision {
    /// Whether `answer` is acceptable; an empty option list accepts anything.
    pub fn accepts(&self, answer: &str) -> bool {
        self.options.is_empty() || self.options.iter().any(|option| option == answer)
    }
}

/// Run the reduction pipeline for one projection.
pub fn reduce<'a, P, I>(events: I) -> P::Snapshot
where
    P: Projection,
    I: IntoIterator<Item = &'a Event>,
{
    let input: Vec<&'a Event> = events.into_iter().collect();
    let canonical = canonicalize(input.iter().copied());
    let mut anomalies = AnomalyLog::new(P::DOMAIN);

    let mut decoded: Vec<(&Event, DomainPayload)> = Vec::new();
    for event in canonical.iter().copied() {
        match event.kind() {
            Some(kind) if P::EVENT_TYPES.contains(&kind) => {
                match DomainPayload::decode(kind, &event.payload) {
                    Ok(payload) => decoded.push((event, payload)),
                    Err(e) => anomalies.record(
                        AnomalyKind::MalformedPayload,
                        event,
                        format!("{} payload rejected: {}", kind, e),
                    ),
                }
            }
            Some(_) => {}
            None if Domain::claiming(&event.event_type) == Some(P::DOMAIN) => {
                anomalies.record(
                    AnomalyKind::UnrecognizedEventType,
                    event,
                    format!("Unrecognized {} event type '{}'", P::DOMAIN, event.event_type),
                );
            }
            None => {}
        }
    }

    let well_formed: Vec<(&Event, &DomainPayload)> = decoded
        .iter()
        .map(|(event, payload)| (*event, payload))
        .collect();

    let mut state = P::default();
    state.prepare(&well_formed);
    for (event, payload) in &well_formed {
        state.apply(event, payload, &mut anomalies);
    }

    let event_count = well_formed.len();
    ReductionMetrics::record(P::DOMAIN.as_str(), input.len(), canonical.len(), event_count);
    tracing::debug!(
        domain = %P::DOMAIN,
        input = input.len(),
        canonical = canonical.len(),
        folded = event_count,
        anomalies = anomalies.len(),
        "Reduction complete"
    );

    state.freeze(ReductionSummary {
        event_count,
        anomalies: anomalies.into_vec(),
        last_event_id: well_formed.last().map(|(event, _)| event.event_id.clone()),
    })
}
