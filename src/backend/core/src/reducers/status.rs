//! Work-package lane reducer.
//!
//! Each work package moves through the lanes
//! `planned → claimed → in_progress → for_review → done`, with `blocked`
//! reachable from any active lane and `canceled` from any lane. `done` and
//! `canceled` are terminal. A forced transition bypasses the matrix.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{AnomalyKind, AnomalyLog, Projection, ReductionSummary};
use crate::events::payload::WpStatusChanged;
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind, Lane};
use crate::merge::is_concurrent;

/// Event kinds folded by the status reducer.
pub const EVENT_TYPES: &[EventKind] = &[EventKind::WpStatusChanged];

/// Whether `from → to` is allowed without `force`.
pub fn is_allowed_transition(from: Lane, to: Lane) -> bool {
    use Lane::*;
    matches!(
        (from, to),
        (Planned, Claimed | Blocked | Canceled)
            | (Claimed, InProgress | Planned | Blocked | Canceled)
            | (InProgress, ForReview | Planned | Blocked | Canceled)
            | (ForReview, Done | InProgress | Planned | Blocked | Canceled)
            | (Blocked, Planned | Claimed | InProgress | Canceled)
    )
}

fn is_rollback(change: &WpStatusChanged) -> bool {
    change.from_lane == Lane::ForReview
        && change.to_lane == Lane::InProgress
        && change.review_ref.is_some()
}

fn is_forward_completion(change: &WpStatusChanged) -> bool {
    change.from_lane == Lane::ForReview && change.to_lane == Lane::Done
}

/// Current state of one work package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPackageStatus {
    pub wp_id: String,
    pub feature_slug: String,
    pub lane: Lane,
    pub actor: Option<String>,
    /// Review that last sent the package back
    pub review_ref: Option<String>,
    pub execution_mode: Option<String>,
    pub transitions: u32,
    pub forced_transitions: u32,
    pub last_event_id: Option<EventId>,
}

impl WorkPackageStatus {
    fn new(change: &WpStatusChanged) -> Self {
        Self {
            wp_id: change.wp_id.clone(),
            feature_slug: change.feature_slug.clone(),
            lane: Lane::Planned,
            actor: None,
            review_ref: None,
            execution_mode: None,
            transitions: 0,
            forced_transitions: 0,
            last_event_id: None,
        }
    }
}

/// Frozen lane state of every work package seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub work_packages: BTreeMap<String, WorkPackageStatus>,
    /// Work packages per lane; every lane is present
    pub summary: BTreeMap<Lane, usize>,
    pub event_count: usize,
    pub anomalies: Vec<super::Anomaly>,
    pub last_event_id: Option<EventId>,
}

impl StatusSnapshot {
    pub fn lane_of(&self, wp_id: &str) -> Option<Lane> {
        self.work_packages.get(wp_id).map(|wp| wp.lane)
    }
}

#[derive(Debug, Default)]
struct StatusProjection {
    work_packages: BTreeMap<String, WorkPackageStatus>,
    superseded: HashSet<EventId>,
}

impl Projection for StatusProjection {
    type Snapshot = StatusSnapshot;

    const DOMAIN: Domain = Domain::Status;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    /// Mark forward completions that lost to a concurrent reviewer rollback.
    fn prepare(&mut self, events: &[(&Event, &DomainPayload)]) {
        let changes: Vec<(&Event, &WpStatusChanged)> = events
            .iter()
            .filter_map(|(event, payload)| match payload {
                DomainPayload::WpStatusChanged(change) => Some((*event, change)),
                _ => None,
            })
            .collect();

        for (forward, change) in changes.iter().filter(|(_, c)| is_forward_completion(c)) {
            let rolled_back = changes.iter().any(|(rollback, other)| {
                is_rollback(other) && other.wp_id == change.wp_id && is_concurrent(forward, rollback)
            });
            if rolled_back {
                self.superseded.insert(forward.event_id.clone());
            }
        }
    }

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        let DomainPayload::WpStatusChanged(change) = payload else {
            return;
        };

        if self.superseded.contains(&event.event_id) {
            anomalies.record(
                AnomalyKind::SupersededByRollback,
                event,
                format!(
                    "{} for_review -> done superseded by a concurrent reviewer rollback",
                    change.wp_id
                ),
            );
            return;
        }

        let wp = self
            .work_packages
            .entry(change.wp_id.clone())
            .or_insert_with(|| WorkPackageStatus::new(change));
        let current = wp.lane;

        if change.from_lane != current {
            anomalies.record(
                AnomalyKind::FromLaneMismatch,
                event,
                format!(
                    "{} claims from_lane {} but is in {}",
                    change.wp_id, change.from_lane, current
                ),
            );
        }

        if change.force {
            if change.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
                anomalies.record(
                    AnomalyKind::ForceWithoutReason,
                    event,
                    format!("Forced move of {} to {} has no reason", change.wp_id, change.to_lane),
                );
            }
        } else if current.is_terminal() {
            anomalies.record(
                AnomalyKind::EventAfterTerminal,
                event,
                format!("{} is {}; move to {} ignored", change.wp_id, current, change.to_lane),
            );
            return;
        } else if !is_allowed_transition(current, change.to_lane) {
            anomalies.record(
                AnomalyKind::InvalidTransition,
                event,
                format!("{} cannot move {} -> {}", change.wp_id, current, change.to_lane),
            );
        }

        wp.lane = change.to_lane;
        wp.actor = Some(change.actor.clone());
        if change.review_ref.is_some() {
            wp.review_ref = change.review_ref.clone();
        }
        if change.execution_mode.is_some() {
            wp.execution_mode = change.execution_mode.clone();
        }
        wp.transitions += 1;
        if change.force {
            wp.forced_transitions += 1;
        }
        wp.last_event_id = Some(event.event_id.clone());
    }

    fn freeze(self, summary: ReductionSummary) -> StatusSnapshot {
        let mut lanes: BTreeMap<Lane, usize> = Lane::ALL.iter().map(|lane| (*lane, 0)).collect();
        for wp in self.work_packages.values() {
            *lanes.entry(wp.lane).or_default() += 1;
        }

        StatusSnapshot {
            work_packages: self.work_packages,
            summary: lanes,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

/// Reduce lane-change events into per-work-package lanes.
pub fn reduce_status_events<'a, I>(events: I) -> StatusSnapshot
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<StatusProjection, _>(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(id: &str, node: &str, clock: u64, from: &str, to: &str) -> Event {
        Event::builder("WPStatusChanged", "WP01")
            .with_event_id(id)
            .with_node(node)
            .lamport_clock(clock)
            .with_payload_value(json!({
                "feature_slug": "001-feature",
                "wp_id": "WP01",
                "from_lane": from,
                "to_lane": to,
                "actor": "agent"
            }))
            .build()
    }

    fn with_payload(mut event: Event, extra: serde_json::Value) -> Event {
        if let (Some(target), Some(source)) = (event.payload.as_object_mut(), extra.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        event
    }

    fn kinds(snapshot: &StatusSnapshot) -> Vec<AnomalyKind> {
        snapshot.anomalies.iter().map(|a| a.kind).collect()
    }

    fn to_review() -> Vec<Event> {
        vec![
            change("e1", "n", 1, "planned", "claimed"),
            change("e2", "n", 2, "claimed", "doing"),
            change("e3", "n", 3, "in_progress", "for_review"),
        ]
    }

    #[test]
    fn test_happy_path_with_alias() {
        let mut events = to_review();
        events.push(change("e4", "n", 4, "for_review", "done"));

        let snapshot = reduce_status_events(&events);
        assert_eq!(snapshot.lane_of("WP01"), Some(Lane::Done));
        assert!(snapshot.anomalies.is_empty());
        assert_eq!(snapshot.event_count, 4);
        assert_eq!(snapshot.summary[&Lane::Done], 1);
        assert_eq!(snapshot.summary[&Lane::Planned], 0);
    }

    #[test]
    fn test_invalid_transition_still_applies() {
        let events = vec![change("e1", "n", 1, "planned", "done")];
        let snapshot = reduce_status_events(&events);

        assert_eq!(snapshot.lane_of("WP01"), Some(Lane::Done));
        assert_eq!(kinds(&snapshot), vec![AnomalyKind::InvalidTransition]);
    }

    #[test]
    fn test_from_lane_mismatch_recorded() {
        let events = vec![change("e1", "n", 1, "claimed", "in_progress")];
        let snapshot = reduce_status_events(&events);

        assert_eq!(
            kinds(&snapshot),
            vec![AnomalyKind::FromLaneMismatch, AnomalyKind::InvalidTransition]
        );
        assert_eq!(snapshot.lane_of("WP01"), Some(Lane::InProgress));
    }

    #[test]
    fn test_terminal_lane_ignores_unforced_moves() {
        let events = vec![
            change("e1", "n", 1, "planned", "canceled"),
            change("e2", "n", 2, "canceled", "claimed"),
        ];
        let snapshot = reduce_status_events(&events);

        assert_eq!(snapshot.lane_of("WP01"), Some(Lane::Canceled));
        assert_eq!(kinds(&snapshot), vec![AnomalyKind::EventAfterTerminal]);
        assert_eq!(snapshot.event_count, 2);
    }

    #[test]
    fn test_force_bypasses_matrix_but_wants_reason() {
        let events = vec![
            change("e1", "n", 1, "planned", "canceled"),
            with_payload(change("e2", "n", 2, "canceled", "planned"), json!({"force": true})),
        ];
        let snapshot = reduce_status_events(&events);

        assert_eq!(snapshot.lane_of("WP01"), Some(Lane::Planned));
        assert_eq!(kinds(&snapshot), vec![AnomalyKind::ForceWithoutReason]);
        assert_eq!(snapshot.work_packages["WP01"].forced_transitions, 1);
    }

    #[test]
    fn test_rollback_supersedes_concurrent_completion() {
        let mut events = to_review();
        events.push(change("e4", "alice", 4, "for_review", "done"));
        events.push(with_payload(
            change("e5", "bob", 4, "for_review", "in_progress"),
            json!({"review_ref": "review-7"}),
        ));

        let snapshot = reduce_status_events(&events);
        let wp = &snapshot.work_packages["WP01"];
        assert_eq!(wp.lane, Lane::InProgress);
        assert_eq!(wp.review_ref.as_deref(), Some("review-7"));
        assert_eq!(kinds(&snapshot), vec![AnomalyKind::SupersededByRollback]);
    }

    #[test]
    fn test_sequential_rollback_after_done_is_after_terminal() {
        let mut events = to_review();
        events.push(change("e4", "n", 4, "for_review", "done"));
        events.push(with_payload(
            change("e5", "n", 5, "for_review", "in_progress"),
            json!({"review_ref": "review-7"}),
        ));

        let snapshot = reduce_status_events(&events);
        assert_eq!(snapshot.lane_of("WP01"), Some(Lane::Done));
        assert_eq!(
            kinds(&snapshot),
            vec![AnomalyKind::FromLaneMismatch, AnomalyKind::EventAfterTerminal]
        );
    }

    #[test]
    fn test_unknown_lane_payload_is_malformed() {
        let events = vec![change("e1", "n", 1, "planned", "archived")];
        let snapshot = reduce_status_events(&events);

        assert_eq!(snapshot.event_count, 0);
        assert_eq!(kinds(&snapshot), vec![AnomalyKind::MalformedPayload]);
        assert!(snapshot.work_packages.is_empty());
    }
}
