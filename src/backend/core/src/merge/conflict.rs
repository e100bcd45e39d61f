//! Concurrency detection, causal ordering and state-machine merges.
//!
//! Concurrency here is the Lamport approximation of vector-clock
//! concurrency: two events on the same aggregate with the same clock value
//! and no direct causation link between them.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use crate::error::{MissionLogError, Result};
use crate::events::{Event, EventId};
use crate::ordering::canonicalize;
use crate::telemetry::metrics::MergeMetrics;

// =============================================================================
// Concurrency
// =============================================================================

/// Whether `a` and `b` are concurrent writes to the same aggregate.
///
/// Events on different aggregates are never concurrent, and an event is
/// never concurrent with itself.
pub fn is_concurrent(a: &Event, b: &Event) -> bool {
    a.aggregate_id == b.aggregate_id
        && a.lamport_clock == b.lamport_clock
        && a.event_id != b.event_id
        && a.causation_id.as_ref() != Some(&b.event_id)
        && b.causation_id.as_ref() != Some(&a.event_id)
}

/// Groups of two or more mutually concurrent events.
///
/// Groups are keyed by (lamport clock, aggregate) and returned in that
/// order; members are in canonical order.
pub fn find_conflicts<'a, I>(events: I) -> Vec<Vec<&'a Event>>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut buckets: BTreeMap<(u64, &'a str), Vec<&'a Event>> = BTreeMap::new();
    for event in canonicalize(events) {
        buckets
            .entry((event.lamport_clock, event.aggregate_id.as_str()))
            .or_default()
            .push(event);
    }

    buckets
        .into_values()
        .filter_map(|bucket| {
            let members: Vec<&Event> = bucket
                .iter()
                .copied()
                .filter(|event| bucket.iter().any(|other| is_concurrent(event, other)))
                .collect();
            (members.len() >= 2).then_some(members)
        })
        .collect()
}

// =============================================================================
// Causal order
// =============================================================================

/// Linearize events so each appears after the event that caused it.
///
/// Ties among causally unrelated events break by [`OrderKey`], so the result
/// is a single deterministic order. Causation ids pointing outside the input
/// make an event a root. A causation cycle cannot be ordered; its members are
/// appended in canonical order.
///
/// [`OrderKey`]: crate::ordering::OrderKey
pub fn topological_sort<'a, I>(events: I) -> Vec<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    let canonical = canonicalize(events);
    let mut graph: DiGraph<&'a Event, ()> =
        DiGraph::with_capacity(canonical.len(), canonical.len());

    let nodes: HashMap<&EventId, NodeIndex> = canonical
        .iter()
        .map(|event| (&event.event_id, graph.add_node(*event)))
        .collect();

    for event in &canonical {
        let child = nodes[&event.event_id];
        if let Some(parent) = event.causation_id.as_ref().and_then(|id| nodes.get(id)) {
            if *parent != child {
                graph.add_edge(*parent, child, ());
            }
        }
    }

    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<_>> = graph
        .node_indices()
        .filter(|idx| in_degree[idx] == 0)
        .map(|idx| Reverse((graph[idx].order_key(), idx)))
        .collect();

    let mut ordered: Vec<&'a Event> = Vec::with_capacity(canonical.len());
    while let Some(Reverse((_, idx))) = ready.pop() {
        ordered.push(graph[idx]);
        for child in graph.neighbors_directed(idx, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&child) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((graph[child].order_key(), child)));
                }
            }
        }
    }

    if ordered.len() < canonical.len() {
        let placed: HashSet<&EventId> = ordered.iter().map(|e| &e.event_id).collect();
        let stranded: Vec<&'a Event> = canonical
            .iter()
            .copied()
            .filter(|event| !placed.contains(&event.event_id))
            .collect();
        tracing::warn!(
            stranded = stranded.len(),
            "Causation cycle detected; appending remaining events in canonical order"
        );
        ordered.extend(stranded);
    }

    ordered
}

// =============================================================================
// State-machine merge
// =============================================================================

/// Priority ranking over resulting states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePriority {
    pub priorities: BTreeMap<String, i64>,
    /// Payload field holding the resulting state
    #[serde(default = "default_state_field")]
    pub state_field: String,
    /// Consulted when `state_field` is absent
    #[serde(default = "default_fallback_field")]
    pub fallback_field: Option<String>,
}

fn default_state_field() -> String {
    "state".to_string()
}

fn default_fallback_field() -> Option<String> {
    Some("to_lane".to_string())
}

impl StatePriority {
    pub fn new<K, I>(priorities: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, i64)>,
    {
        Self {
            priorities: priorities.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            state_field: default_state_field(),
            fallback_field: default_fallback_field(),
        }
    }

    /// Work-package lane priorities, terminal lanes first.
    pub fn lane_defaults() -> Self {
        Self::new([
            ("done", 6),
            ("canceled", 5),
            ("for_review", 4),
            ("in_progress", 3),
            ("blocked", 2),
            ("claimed", 1),
            ("planned", 0),
        ])
    }

    pub fn with_state_field(mut self, field: impl Into<String>) -> Self {
        self.state_field = field.into();
        self
    }

    /// The state an event transitions to, if its payload names one.
    pub fn resolved_state<'e>(&self, event: &'e Event) -> Option<&'e str> {
        event.payload_str(&self.state_field).or_else(|| {
            self.fallback_field
                .as_deref()
                .and_then(|field| event.payload_str(field))
        })
    }

    /// Priority of a state; unknown states rank 0.
    pub fn priority_of(&self, state: Option<&str>) -> i64 {
        state
            .and_then(|s| self.priorities.get(s))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for StatePriority {
    fn default() -> Self {
        Self::lane_defaults()
    }
}

/// Outcome of a state-machine merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResolution {
    pub winner: EventId,
    pub winning_state: Option<String>,
    pub winning_priority: i64,
    /// Every event considered, in canonical order
    pub conflicting_events: Vec<EventId>,
    pub resolution: String,
    /// Top priorities tied; no policy could decide
    pub requires_manual_review: bool,
}

/// Pick the event whose resulting state ranks highest.
///
/// Ties on priority go to the highest order key and flag the resolution for
/// manual review.
///
/// # Errors
///
/// `EmptyConflictSet` when `events` is empty.
pub fn state_machine_merge<'a, I>(events: I, priority: &StatePriority) -> Result<MergeResolution>
where
    I: IntoIterator<Item = &'a Event>,
{
    let canonical = canonicalize(events);

    let mut ranked: Vec<(i64, &Event)> = canonical
        .iter()
        .map(|event| (priority.priority_of(priority.resolved_state(event)), *event))
        .collect();
    ranked.sort_by(|(pa, a), (pb, b)| pb.cmp(pa).then_with(|| b.order_key().cmp(&a.order_key())));

    let (winning_priority, winner) = *ranked.first().ok_or_else(MissionLogError::empty_conflict_set)?;
    let requires_manual_review = ranked
        .get(1)
        .is_some_and(|(runner_up, _)| *runner_up == winning_priority);

    let winning_state = priority.resolved_state(winner).map(str::to_string);
    let state_label = winning_state.as_deref().unwrap_or("<none>");
    let resolution = if requires_manual_review {
        format!(
            "Priority tie at {} across {} events; selected '{}' from {} by latest order key",
            winning_priority,
            canonical.len(),
            state_label,
            winner.event_id
        )
    } else {
        format!(
            "Selected '{}' (priority {}) from {} by state priority over {} events",
            state_label,
            winning_priority,
            winner.event_id,
            canonical.len()
        )
    };

    MergeMetrics::record(requires_manual_review);
    tracing::debug!(
        winner = %winner.event_id,
        conflicts = canonical.len(),
        requires_manual_review,
        "State machine merge resolved"
    );

    Ok(MergeResolution {
        winner: winner.event_id.clone(),
        winning_state,
        winning_priority,
        conflicting_events: canonical.iter().map(|e| e.event_id.clone()).collect(),
        resolution,
        requires_manual_review,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn event(id: &str, aggregate: &str, clock: u64, state: &str) -> Event {
        Event::builder("WPStatusChanged", aggregate)
            .with_event_id(id)
            .with_node("n")
            .lamport_clock(clock)
            .with_payload_value(json!({ "state": state }))
            .build()
    }

    #[test]
    fn test_concurrency_requires_same_aggregate_and_clock() {
        let a = event("a", "WP001", 5, "done");
        let b = event("b", "WP001", 5, "for_review");
        let c = event("c", "WP002", 5, "done");
        let d = event("d", "WP001", 6, "done");

        assert!(is_concurrent(&a, &b));
        assert!(!is_concurrent(&a, &c));
        assert!(!is_concurrent(&a, &d));
        assert!(!is_concurrent(&a, &a));
    }

    #[test]
    fn test_causation_link_breaks_concurrency() {
        let a = event("a", "WP001", 5, "done");
        let b = Event {
            causation_id: Some(EventId::from("a")),
            ..event("b", "WP001", 5, "for_review")
        };
        assert!(!is_concurrent(&a, &b));
        assert!(!is_concurrent(&b, &a));
    }

    #[test]
    fn test_find_conflicts_groups() {
        let events = vec![
            event("a", "WP001", 5, "done"),
            event("b", "WP001", 5, "for_review"),
            event("c", "WP002", 5, "done"),
            event("d", "WP001", 6, "done"),
        ];
        let groups = find_conflicts(&events);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_topological_sort_parents_first() {
        let root = event("r", "x", 9, "a");
        let child = Event {
            causation_id: Some(EventId::from("r")),
            ..event("c", "x", 1, "b")
        };
        let orphan = Event {
            causation_id: Some(EventId::from("missing")),
            ..event("o", "x", 2, "c")
        };
        let events = vec![child, root, orphan];

        let ordered: Vec<_> = topological_sort(&events)
            .iter()
            .map(|e| e.event_id.to_string())
            .collect();
        assert_eq!(ordered, vec!["o", "r", "c"]);
    }

    #[test]
    fn test_topological_sort_survives_cycles() {
        let a = Event {
            causation_id: Some(EventId::from("b")),
            ..event("a", "x", 1, "s")
        };
        let b = Event {
            causation_id: Some(EventId::from("a")),
            ..event("b", "x", 2, "s")
        };
        let c = event("c", "x", 3, "s");
        let events = vec![a, b, c];

        let ordered: Vec<_> = topological_sort(&events)
            .iter()
            .map(|e| e.event_id.to_string())
            .collect();
        assert_eq!(ordered, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_merge_picks_highest_priority() {
        let events = vec![
            event("a", "WP001", 5, "for_review"),
            event("b", "WP001", 5, "done"),
        ];
        let priority = StatePriority::new([("done", 4), ("for_review", 3)]);

        let resolution = state_machine_merge(&events, &priority).unwrap();
        assert_eq!(resolution.winner.as_str(), "b");
        assert_eq!(resolution.winning_state.as_deref(), Some("done"));
        assert!(!resolution.requires_manual_review);
        assert_eq!(resolution.conflicting_events.len(), 2);
    }

    #[test]
    fn test_merge_tie_requires_review() {
        let events = vec![
            event("a", "WP001", 5, "blocked"),
            event("b", "WP001", 5, "mystery"),
        ];
        let priority = StatePriority::new([("blocked", 0)]);

        let resolution = state_machine_merge(&events, &priority).unwrap();
        assert!(resolution.requires_manual_review);
        assert_eq!(resolution.winner.as_str(), "b");
    }

    #[test]
    fn test_merge_falls_back_to_lane_field() {
        let lane_event = Event::builder("WPStatusChanged", "WP001")
            .with_event_id("a")
            .with_payload_value(json!({"to_lane": "done"}))
            .build();
        let resolution =
            state_machine_merge([&lane_event], &StatePriority::lane_defaults()).unwrap();
        assert_eq!(resolution.winning_priority, 6);
    }

    #[test]
    fn test_merge_empty_is_error() {
        let events: Vec<Event> = Vec::new();
        let err = state_machine_merge(&events, &StatePriority::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyConflictSet);
    }
}
