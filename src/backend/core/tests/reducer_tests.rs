//! Integration tests for the domain reducers.

use missionlog_core::events::{Event, EventStore, JsonlEventStore, Lane};
use missionlog_core::reducers::lifecycle::MissionStatus;
use missionlog_core::reducers::mission_audit::AuditStatus;
use missionlog_core::events::payload::AuditVerdict;
use missionlog_core::reducers::{
    reduce_collaboration_events, reduce_connector_events, reduce_decision_point_events,
    reduce_glossary_events, reduce_lifecycle_events, reduce_mission_audit_events,
    reduce_mission_next_events, reduce_status_events, reduce_sync_events, AnomalyKind,
};
use proptest::prelude::*;
use serde_json::json;

const LANES: [&str; 7] = [
    "planned",
    "claimed",
    "in_progress",
    "for_review",
    "done",
    "blocked",
    "canceled",
];

fn event(id: &str, clock: u64, node: &str, event_type: &str, payload: serde_json::Value) -> Event {
    Event::builder(event_type, "agg-1")
        .with_event_id(id)
        .with_node(node)
        .lamport_clock(clock)
        .with_payload_value(payload)
        .build()
}

fn lane_change(id: &str, clock: u64, node: &str, wp: &str, from: &str, to: &str) -> Event {
    event(
        id,
        clock,
        node,
        "WPStatusChanged",
        json!({
            "feature_slug": "034-feature",
            "wp_id": wp,
            "from_lane": from,
            "to_lane": to,
            "actor": "agent"
        }),
    )
}

#[test]
fn test_status_fold_with_mixed_domains() {
    let events = vec![
        lane_change("e1", 1, "a", "WP01", "planned", "claimed"),
        event("m1", 1, "a", "MissionCreated", json!({"mission_type": "software-dev"})),
        lane_change("e2", 2, "a", "WP01", "claimed", "in_progress"),
        lane_change("e3", 2, "b", "WP02", "planned", "claimed"),
        event("m2", 3, "a", "MissionStarted", json!({})),
        lane_change("e4", 3, "a", "WP01", "in_progress", "for_review"),
    ];

    let status = reduce_status_events(&events);
    assert_eq!(status.event_count, 4);
    assert_eq!(status.lane_of("WP01"), Some(Lane::ForReview));
    assert_eq!(status.lane_of("WP02"), Some(Lane::Claimed));
    assert_eq!(status.summary[&Lane::Claimed], 1);
    assert_eq!(status.summary[&Lane::Done], 0);
    assert!(status.anomalies.is_empty());

    let lifecycle = reduce_lifecycle_events(&events);
    assert_eq!(lifecycle.event_count, 2);
    assert_eq!(lifecycle.status, Some(MissionStatus::Active));
}

#[test]
fn test_arrival_order_does_not_matter() {
    let events = vec![
        lane_change("e1", 1, "a", "WP01", "planned", "claimed"),
        lane_change("e2", 2, "a", "WP01", "claimed", "in_progress"),
        lane_change("e3", 3, "a", "WP01", "in_progress", "for_review"),
        lane_change("e4", 4, "a", "WP01", "for_review", "done"),
    ];
    let expected = reduce_status_events(&events);

    let mut reversed: Vec<&Event> = events.iter().collect();
    reversed.reverse();
    assert_eq!(reduce_status_events(reversed), expected);

    let rotated: Vec<&Event> = events.iter().cycle().skip(2).take(events.len()).collect();
    assert_eq!(reduce_status_events(rotated), expected);
    assert_eq!(expected.lane_of("WP01"), Some(Lane::Done));
}

#[test]
fn test_redelivery_is_idempotent() {
    let events = vec![
        event("a1", 1, "n", "MissionAuditRequested", json!({})),
        event("a2", 2, "n", "MissionAuditStarted", json!({})),
        event("a3", 3, "n", "MissionAuditCompleted", json!({"verdict": "pass"})),
    ];
    let once = reduce_mission_audit_events(&events);
    let twice = reduce_mission_audit_events(events.iter().chain(events.iter()));

    assert_eq!(once, twice);
    assert_eq!(twice.event_count, 3);
    assert_eq!(twice.audit_status, AuditStatus::Completed);
}

#[test]
fn test_malformed_payload_is_anomaly() {
    let events = vec![
        lane_change("e1", 1, "a", "WP01", "planned", "claimed"),
        event(
            "e2",
            2,
            "a",
            "WPStatusChanged",
            json!({"wp_id": "WP01", "from_lane": "claimed", "to_lane": "sideways"}),
        ),
    ];
    let status = reduce_status_events(&events);

    assert_eq!(status.event_count, 1);
    assert_eq!(status.anomalies[0].kind, AnomalyKind::MalformedPayload);
    assert_eq!(status.lane_of("WP01"), Some(Lane::Claimed));
}

#[test]
fn test_reduce_from_jsonl_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlEventStore::open(dir.path().join("events.jsonl")).unwrap();

    let events = vec![
        event("c1", 1, "n", "ParticipantJoined", json!({"participant_id": "ana"})),
        event("c2", 2, "n", "DriveIntentSet", json!({"participant_id": "ana", "intent": "active"})),
    ];
    for e in &events {
        assert!(store.save(e).unwrap());
    }
    assert!(!store.save(&events[0]).unwrap());

    let reopened = JsonlEventStore::open(store.path()).unwrap();
    let loaded = reopened.load(Some("agg-1")).unwrap();
    let state = reduce_collaboration_events(&loaded);

    assert_eq!(state.event_count, 2);
    assert_eq!(state.active_drivers, vec!["ana".to_string()]);
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for shorter in permutations(n - 1) {
        for slot in 0..=shorter.len() {
            let mut next = shorter.clone();
            next.insert(slot, n - 1);
            out.push(next);
        }
    }
    out
}

#[test]
fn test_audit_outcome_same_for_every_arrival_order() {
    let events = vec![
        event("a1", 1, "n", "MissionAuditRequested", json!({})),
        event("a2", 2, "n", "MissionAuditStarted", json!({})),
        event("a3", 3, "n", "MissionAuditDecisionRequested", json!({"decision_id": "d1"})),
        event("a4", 4, "n", "MissionAuditCompleted", json!({"verdict": "pass"})),
    ];

    let orders = permutations(events.len());
    assert_eq!(orders.len(), 24);

    let expected = reduce_mission_audit_events(&events);
    assert_eq!(expected.audit_status, AuditStatus::Completed);
    assert_eq!(expected.verdict, Some(AuditVerdict::Pass));
    assert!(expected.pending_decisions.is_empty());
    assert!(expected.anomalies.is_empty());
    assert_eq!(expected.event_count, 4);

    for order in &orders {
        let arrived: Vec<&Event> = order.iter().map(|&i| &events[i]).collect();
        assert_eq!(reduce_mission_audit_events(arrived), expected, "order {:?}", order);
    }
}

fn status_history() -> impl Strategy<Value = (Vec<Event>, Vec<usize>)> {
    prop::collection::vec((0u64..12, 0usize..3, 0usize..3, 0usize..7, 0usize..7), 0..24)
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (clock, node, wp, from, to))| {
                    lane_change(
                        &format!("e{i:03}"),
                        clock,
                        ["a", "b", "c"][node],
                        &format!("WP0{wp}"),
                        LANES[from],
                        LANES[to],
                    )
                })
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|events| {
            let order: Vec<usize> = (0..events.len()).collect();
            (Just(events), Just(order).prop_shuffle())
        })
}

proptest! {
    #[test]
    fn prop_status_reduction_is_permutation_invariant((events, order) in status_history()) {
        let shuffled: Vec<&Event> = order.iter().map(|&i| &events[i]).collect();
        prop_assert_eq!(reduce_status_events(&events), reduce_status_events(shuffled));
    }

    #[test]
    fn prop_status_reduction_ignores_duplicates((events, order) in status_history()) {
        let doubled: Vec<&Event> = events.iter().chain(order.iter().map(|&i| &events[i])).collect();
        prop_assert_eq!(reduce_status_events(&events), reduce_status_events(doubled));
    }

    #[test]
    fn prop_event_count_bounded_by_input((events, _order) in status_history()) {
        let snapshot = reduce_status_events(&events);
        prop_assert!(snapshot.event_count <= events.len());
        let total: usize = snapshot.summary.values().sum();
        prop_assert_eq!(total, snapshot.work_packages.len());
    }
}

// One entry per event kind the reducers fold, with a small fixed payload.
const TEMPLATES: &[(&str, &str)] = &[
    ("WPStatusChanged", r#"{"feature_slug":"f","wp_id":"WP01","from_lane":"planned","to_lane":"claimed","actor":"a"}"#),
    ("WPStatusChanged", r#"{"feature_slug":"f","wp_id":"WP01","from_lane":"claimed","to_lane":"blocked","actor":"b"}"#),
    ("WPStatusChanged", r#"{"feature_slug":"f","wp_id":"WP01","from_lane":"for_review","to_lane":"done","actor":"a","force":true}"#),
    ("MissionCreated", r#"{"mission_type":"software-dev"}"#),
    ("MissionStarted", r#"{}"#),
    ("MissionPaused", r#"{"reason":"lunch"}"#),
    ("MissionResumed", r#"{}"#),
    ("PhaseEntered", r#"{"phase":"implement"}"#),
    ("MissionCompleted", r#"{}"#),
    ("MissionCancelled", r#"{"reason":"scope"}"#),
    ("MissionAuditRequested", r#"{}"#),
    ("MissionAuditStarted", r#"{"audit_scope":["src"]}"#),
    ("MissionAuditDecisionRequested", r#"{"decision_id":"d1","options":["yes","no"]}"#),
    ("MissionAuditCompleted", r#"{"verdict":"pass"}"#),
    ("MissionAuditFailed", r#"{"error_code":"TIMEOUT"}"#),
    ("DecisionPointOpened", r#"{"decision_id":"dp1","options":["a","b"]}"#),
    ("DecisionPointDiscussing", r#"{"decision_id":"dp1","participant":"ana"}"#),
    ("DecisionPointResolved", r#"{"decision_id":"dp1","chosen_option":"a"}"#),
    ("DecisionPointOverridden", r#"{"decision_id":"dp1","chosen_option":"b"}"#),
    ("ConnectorProvisioned", r#"{"connector_id":"c1","provider":"gh","scopes":["repo"]}"#),
    ("ConnectorHealthChecked", r#"{"connector_id":"c1","healthy":false}"#),
    ("ConnectorHealthChecked", r#"{"connector_id":"c1","healthy":true,"latency_ms":12}"#),
    ("ConnectorDegraded", r#"{"connector_id":"c1"}"#),
    ("ConnectorRecovered", r#"{"connector_id":"c1"}"#),
    ("ConnectorRevoked", r#"{"connector_id":"c1"}"#),
    ("ConnectorDecommissioned", r#"{"connector_id":"c1"}"#),
    ("SyncIngestAccepted", r#"{"delivery_id":"s1"}"#),
    ("SyncIngestRejected", r#"{"delivery_id":"s1","retryable":true}"#),
    ("SyncRetryScheduled", r#"{"delivery_id":"s1","attempt":1}"#),
    ("SyncRetryScheduled", r#"{"delivery_id":"s1","attempt":2}"#),
    ("SyncDeadLettered", r#"{"delivery_id":"s1","attempts":3}"#),
    ("MissionRunStarted", r#"{"mission_type":"software-dev"}"#),
    ("NextStepIssued", r#"{"step_id":"st1"}"#),
    ("NextStepAutoCompleted", r#"{"step_id":"st1","result":"success"}"#),
    ("DecisionInputRequested", r#"{"decision_id":"q1","options":["x","y"]}"#),
    ("DecisionInputAnswered", r#"{"decision_id":"q1","answer":"x"}"#),
    ("MissionRunCompleted", r#"{"outcome":"ok"}"#),
    ("ParticipantInvited", r#"{"participant_id":"ana"}"#),
    ("ParticipantJoined", r#"{"participant_id":"ana"}"#),
    ("ParticipantLeft", r#"{"participant_id":"ana"}"#),
    ("DriveIntentSet", r#"{"participant_id":"ana","intent":"active"}"#),
    ("FocusChanged", r#"{"participant_id":"ana","focus_target":"WP01"}"#),
    ("CommentPosted", r#"{"participant_id":"ana","comment_id":"k1"}"#),
    ("WarningRaised", r#"{"warning_id":"w1"}"#),
    ("WarningAcknowledged", r#"{"warning_id":"w1","participant_id":"ana"}"#),
    ("GlossaryScopeActivated", r#"{"scope_id":"team"}"#),
    ("GlossaryStrictnessSet", r#"{"mode":"max"}"#),
    ("TermCandidateObserved", r#"{"term":"Lane","scope_id":"team"}"#),
    ("GlossarySenseUpdated", r#"{"term":"lane","scope_id":"team","sense_id":"s1"}"#),
    ("GlossaryClarificationRequested", r#"{"clarification_id":"cl1","term":"lane"}"#),
    ("GlossaryClarificationResolved", r#"{"clarification_id":"cl1","sense_id":"s1"}"#),
    ("SemanticCheckEvaluated", r#"{"check_id":"k1","outcome":"block"}"#),
    ("GenerationBlockedBySemanticConflict", r#"{"step_id":"st1"}"#),
    ("MissionEscalated", r#"{}"#),
    ("ConnectorHealthChecked", r#"{"connector_id":"c1"}"#),
];

/// Mixed-domain histories where ids repeat across different templates, so
/// copies sharing an id and a full order key often carry different payloads.
fn mixed_history() -> impl Strategy<Value = (Vec<Event>, Vec<usize>)> {
    prop::collection::vec((0usize..24, 0u64..6, 0usize..2, 0..TEMPLATES.len()), 0..40)
        .prop_map(|specs| {
            specs
                .into_iter()
                .map(|(id, clock, node, template)| {
                    let (event_type, payload) = TEMPLATES[template];
                    let payload = serde_json::from_str(payload).unwrap();
                    event(&format!("x{id:02}"), clock, ["a", "b"][node], event_type, payload)
                })
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|events| {
            let order: Vec<usize> = (0..events.len()).collect();
            (Just(events), Just(order).prop_shuffle())
        })
}

/// Checks one reducer against shuffled and redelivered copies of a history.
macro_rules! assert_order_free {
    ($reduce:ident, $events:expr, $order:expr) => {{
        let events: &[Event] = $events;
        let order: &[usize] = $order;
        let baseline = $reduce(events);
        prop_assert!(baseline.event_count <= events.len());

        let shuffled: Vec<&Event> = order.iter().map(|&i| &events[i]).collect();
        prop_assert_eq!(&baseline, &$reduce(shuffled));

        let doubled: Vec<&Event> = events
            .iter()
            .chain(order.iter().map(|&i| &events[i]))
            .collect();
        prop_assert_eq!(&baseline, &$reduce(doubled));
    }};
}

proptest! {
    #[test]
    fn prop_every_reducer_ignores_arrival_order_and_redelivery(
        (events, order) in mixed_history()
    ) {
        assert_order_free!(reduce_status_events, &events, &order);
        assert_order_free!(reduce_lifecycle_events, &events, &order);
        assert_order_free!(reduce_mission_audit_events, &events, &order);
        assert_order_free!(reduce_decision_point_events, &events, &order);
        assert_order_free!(reduce_connector_events, &events, &order);
        assert_order_free!(reduce_sync_events, &events, &order);
        assert_order_free!(reduce_mission_next_events, &events, &order);
        assert_order_free!(reduce_collaboration_events, &events, &order);
        assert_order_free!(reduce_glossary_events, &events, &order);
    }

    #[test]
    fn prop_status_conflicting_copies_resolve_the_same_way(
        lanes in prop::collection::vec((0usize..7, 0usize..7), 1..6),
        order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        // Every copy shares id, clock and node; only the payload differs.
        let copies: Vec<Event> = lanes
            .iter()
            .map(|&(from, to)| lane_change("e1", 1, "a", "WP01", LANES[from], LANES[to]))
            .collect();
        let arrived: Vec<&Event> = order
            .iter()
            .filter(|&&i| i < copies.len())
            .map(|&i| &copies[i])
            .collect();

        let baseline = reduce_status_events(&copies);
        prop_assert_eq!(baseline.event_count, 1);
        prop_assert_eq!(baseline, reduce_status_events(arrived));
    }
}
