//! Collaboration session reducer: roster, drivers, focus, warnings, comments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Anomaly, AnomalyKind, AnomalyLog, Projection, ReductionSummary};
use crate::events::payload::DriveIntent;
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};
use crate::merge::GSet;

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::ParticipantInvited,
    EventKind::ParticipantJoined,
    EventKind::ParticipantLeft,
    EventKind::DriveIntentSet,
    EventKind::FocusChanged,
    EventKind::CommentPosted,
    EventKind::WarningRaised,
    EventKind::WarningAcknowledged,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Invited,
    Joined,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub presence: Presence,
    pub drive_intent: Option<DriveIntent>,
    pub focus: Option<String>,
    pub comments: usize,
}

impl Participant {
    fn new(participant_id: &str, presence: Presence) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            display_name: None,
            role: None,
            presence,
            drive_intent: None,
            focus: None,
            comments: 0,
        }
    }

    pub fn is_driving(&self) -> bool {
        self.presence == Presence::Joined && self.drive_intent == Some(DriveIntent::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub warning_id: String,
    pub message: String,
    pub severity: Option<String>,
    pub raised_by: EventId,
    pub acknowledged_by: GSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationState {
    pub session_id: Option<String>,
    pub participants: BTreeMap<String, Participant>,
    /// Joined participants with an active drive intent, sorted
    pub active_drivers: Vec<String>,
    pub warnings: BTreeMap<String, WarningRecord>,
    pub comment_count: usize,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

impl CollaborationState {
    /// Warnings nobody has acknowledged yet.
    pub fn open_warnings(&self) -> impl Iterator<Item = &WarningRecord> {
        self.warnings.values().filter(|w| w.acknowledged_by.is_empty())
    }

    pub fn focus_of(&self, participant_id: &str) -> Option<&str> {
        self.participants
            .get(participant_id)
            .and_then(|p| p.focus.as_deref())
    }
}

#[derive(Debug, Default)]
struct CollaborationProjection {
    session_id: Option<String>,
    participants: BTreeMap<String, Participant>,
    warnings: BTreeMap<String, WarningRecord>,
    comment_count: usize,
}

impl CollaborationProjection {
    /// A participant that has joined and not left, or `None` after recording
    /// why the event cannot be attributed.
    fn joined(
        &mut self,
        participant_id: &str,
        event: &Event,
        anomalies: &mut AnomalyLog,
    ) -> Option<&mut Participant> {
        match self.participants.get_mut(participant_id) {
            None => {
                anomalies.record(
                    AnomalyKind::UnknownParticipant,
                    event,
                    format!("{} from unknown participant {}", event.event_type, participant_id),
                );
                None
            }
            Some(participant) if participant.presence != Presence::Joined => {
                anomalies.record(
                    AnomalyKind::ParticipantNotJoined,
                    event,
                    format!(
                        "{} from participant {} who has not joined",
                        event.event_type, participant_id
                    ),
                );
                None
            }
            Some(participant) => Some(participant),
        }
    }
}

impl Projection for CollaborationProjection {
    type Snapshot = CollaborationState;

    const DOMAIN: Domain = Domain::Collaboration;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        if self.session_id.is_none() {
            self.session_id = Some(event.aggregate_id.clone());
        }

        match payload {
            DomainPayload::ParticipantInvited(invited) => {
                let participant = self
                    .participants
                    .entry(invited.participant_id.clone())
                    .or_insert_with(|| Participant::new(&invited.participant_id, Presence::Invited));
                if invited.display_name.is_some() {
                    participant.display_name = invited.display_name.clone();
                }
                if invited.role.is_some() {
                    participant.role = invited.role.clone();
                }
            }
            DomainPayload::ParticipantJoined(joined) => {
                let participant = self
                    .participants
                    .entry(joined.participant_id.clone())
                    .or_insert_with(|| Participant::new(&joined.participant_id, Presence::Joined));
                participant.presence = Presence::Joined;
                if joined.display_name.is_some() {
                    participant.display_name = joined.display_name.clone();
                }
            }
            DomainPayload::ParticipantLeft(left) => {
                if let Some(participant) = self.joined(&left.participant_id, event, anomalies) {
                    participant.presence = Presence::Left;
                    participant.drive_intent = None;
                    participant.focus = None;
                }
            }
            DomainPayload::DriveIntentSet(intent) => {
                if let Some(participant) = self.joined(&intent.participant_id, event, anomalies) {
                    participant.drive_intent = Some(intent.intent);
                }
            }
            DomainPayload::FocusChanged(focus) => {
                if let Some(participant) = self.joined(&focus.participant_id, event, anomalies) {
                    participant.focus = Some(focus.focus_target.clone());
                }
            }
            DomainPayload::CommentPosted(comment) => {
                // Comments count even when the author cannot be attributed.
                self.comment_count += 1;
                if let Some(participant) = self.joined(&comment.participant_id, event, anomalies) {
                    participant.comments += 1;
                }
            }
            DomainPayload::WarningRaised(raised) => {
                self.warnings
                    .entry(raised.warning_id.clone())
                    .or_insert_with(|| WarningRecord {
                        warning_id: raised.warning_id.clone(),
                        message: raised.message.clone(),
                        severity: raised.severity.clone(),
                        raised_by: event.event_id.clone(),
                        acknowledged_by: GSet::new(),
                    });
            }
            DomainPayload::WarningAcknowledged(ack) => {
                if !self.participants.contains_key(&ack.participant_id) {
                    anomalies.record(
                        AnomalyKind::UnknownParticipant,
                        event,
                        format!("Warning acknowledged by unknown participant {}", ack.participant_id),
                    );
                }
                match self.warnings.get_mut(&ack.warning_id) {
                    Some(warning) => {
                        warning.acknowledged_by.insert(ack.participant_id.clone());
                    }
                    None => anomalies.record(
                        AnomalyKind::UnknownWarning,
                        event,
                        format!("Acknowledgement of unknown warning {}", ack.warning_id),
                    ),
                }
            }
            _ => {}
        }
    }

    fn freeze(self, summary: ReductionSummary) -> CollaborationState {
        let active_drivers = self
            .participants
            .values()
            .filter(|p| p.is_driving())
            .map(|p| p.participant_id.clone())
            .collect();

        CollaborationState {
            session_id: self.session_id,
            participants: self.participants,
            active_drivers,
            warnings: self.warnings,
            comment_count: self.comment_count,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

/// Reduce collaboration events for one session.
pub fn reduce_collaboration_events<'a, I>(events: I) -> CollaborationState
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<CollaborationProjection, _>(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, clock: u64, event_type: &str, payload: serde_json::Value) -> Event {
        Event::builder(event_type, "session-1")
            .with_event_id(id)
            .with_node("n")
            .lamport_clock(clock)
            .with_payload_value(payload)
            .build()
    }

    #[test]
    fn test_roster_drivers_and_focus() {
        let events = vec![
            event("e1", 1, "ParticipantInvited", json!({"participant_id": "ana", "role": "reviewer"})),
            event("e2", 2, "ParticipantJoined", json!({"participant_id": "ana"})),
            event("e3", 3, "ParticipantJoined", json!({"participant_id": "bo"})),
            event("e4", 4, "DriveIntentSet", json!({"participant_id": "ana", "intent": "active"})),
            event("e5", 5, "DriveIntentSet", json!({"participant_id": "bo", "intent": "active"})),
            event("e6", 6, "FocusChanged", json!({"participant_id": "ana", "focus_target": "WP01"})),
            event("e7", 7, "ParticipantLeft", json!({"participant_id": "bo"})),
            event(
                "e8",
                8,
                "CommentPosted",
                json!({"participant_id": "ana", "comment_id": "c1", "body": "lgtm"}),
            ),
        ];
        let state = reduce_collaboration_events(&events);

        assert_eq!(state.active_drivers, vec!["ana".to_string()]);
        assert_eq!(state.focus_of("ana"), Some("WP01"));
        assert_eq!(state.participants["ana"].role.as_deref(), Some("reviewer"));
        assert_eq!(state.participants["bo"].presence, Presence::Left);
        assert_eq!(state.comment_count, 1);
        assert!(state.anomalies.is_empty());
    }

    #[test]
    fn test_warnings_and_acknowledgements() {
        let events = vec![
            event("e1", 1, "ParticipantJoined", json!({"participant_id": "ana"})),
            event("e2", 2, "WarningRaised", json!({"warning_id": "w1", "message": "drift"})),
            event("e3", 3, "WarningRaised", json!({"warning_id": "w2", "message": "stale"})),
            event("e4", 4, "WarningAcknowledged", json!({"warning_id": "w1", "participant_id": "ana"})),
            event("e5", 5, "WarningAcknowledged", json!({"warning_id": "w9", "participant_id": "ana"})),
        ];
        let state = reduce_collaboration_events(&events);

        let open: Vec<_> = state.open_warnings().map(|w| w.warning_id.as_str()).collect();
        assert_eq!(open, vec!["w2"]);
        assert_eq!(state.anomalies.len(), 1);
        assert_eq!(state.anomalies[0].kind, AnomalyKind::UnknownWarning);
    }

    #[test]
    fn test_actions_from_absent_participants() {
        let events = vec![
            event("e1", 1, "ParticipantInvited", json!({"participant_id": "ana"})),
            event("e2", 2, "FocusChanged", json!({"participant_id": "ana", "focus_target": "WP01"})),
            event(
                "e3",
                3,
                "CommentPosted",
                json!({"participant_id": "ghost", "comment_id": "c1"}),
            ),
        ];
        let state = reduce_collaboration_events(&events);

        let kinds: Vec<_> = state.anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AnomalyKind::ParticipantNotJoined, AnomalyKind::UnknownParticipant]
        );
        assert_eq!(state.focus_of("ana"), None);
        assert_eq!(state.comment_count, 1);
    }
}
