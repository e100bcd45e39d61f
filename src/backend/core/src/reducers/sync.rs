//! Sync delivery reducer.
//!
//! Per delivery: `accepted | rejected → retry_scheduled → accepted |
//! dead_lettered`. Retries are recorded as data; nothing here retries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Anomaly, AnomalyKind, AnomalyLog, Projection, ReductionSummary};
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::SyncIngestAccepted,
    EventKind::SyncIngestRejected,
    EventKind::SyncRetryScheduled,
    EventKind::SyncDeadLettered,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Accepted,
    Rejected,
    RetryScheduled,
    DeadLettered,
}

impl DeliveryStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::DeadLettered)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::RetryScheduled => "retry_scheduled",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub delivery_id: String,
    pub status: DeliveryStatus,
    pub batch_size: Option<u32>,
    /// Highest retry attempt seen
    pub attempts: u32,
    pub last_backoff_ms: Option<u64>,
    pub rejection_reasons: Vec<String>,
    pub last_retryable: Option<bool>,
    pub dead_letter_reason: Option<String>,
}

impl DeliveryRecord {
    fn new(delivery_id: &str, status: DeliveryStatus) -> Self {
        Self {
            delivery_id: delivery_id.to_string(),
            status,
            batch_size: None,
            attempts: 0,
            last_backoff_ms: None,
            rejection_reasons: Vec::new(),
            last_retryable: None,
            dead_letter_reason: None,
        }
    }
}

/// Delivery counts by final status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTotals {
    pub accepted: usize,
    pub rejected: usize,
    pub retry_scheduled: usize,
    pub dead_lettered: usize,
    pub retries: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub deliveries: BTreeMap<String, DeliveryRecord>,
    pub totals: SyncTotals,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

#[derive(Debug, Default)]
struct SyncProjection {
    deliveries: BTreeMap<String, DeliveryRecord>,
}

impl SyncProjection {
    fn terminal_guard(&self, delivery_id: &str, event: &Event, anomalies: &mut AnomalyLog) -> bool {
        match self.deliveries.get(delivery_id) {
            Some(record) if record.status.is_terminal() => {
                anomalies.record(
                    AnomalyKind::EventAfterTerminal,
                    event,
                    format!(
                        "{} after delivery {} was {}",
                        event.event_type,
                        delivery_id,
                        record.status.as_str()
                    ),
                );
                false
            }
            _ => true,
        }
    }
}

impl Projection for SyncProjection {
    type Snapshot = SyncSnapshot;

    const DOMAIN: Domain = Domain::Sync;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        match payload {
            DomainPayload::SyncIngestAccepted(accepted) => {
                if !self.terminal_guard(&accepted.delivery_id, event, anomalies) {
                    return;
                }
                let record = self
                    .deliveries
                    .entry(accepted.delivery_id.clone())
                    .or_insert_with(|| {
                        DeliveryRecord::new(&accepted.delivery_id, DeliveryStatus::Accepted)
                    });
                record.status = DeliveryStatus::Accepted;
                record.batch_size = Some(accepted.batch_size);
            }
            DomainPayload::SyncIngestRejected(rejected) => {
                if !self.terminal_guard(&rejected.delivery_id, event, anomalies) {
                    return;
                }
                let record = self
                    .deliveries
                    .entry(rejected.delivery_id.clone())
                    .or_insert_with(|| {
                        DeliveryRecord::new(&rejected.delivery_id, DeliveryStatus::Rejected)
                    });
                record.status = DeliveryStatus::Rejected;
                record.rejection_reasons.push(rejected.reason.clone());
                record.last_retryable = Some(rejected.retryable);
            }
            DomainPayload::SyncRetryScheduled(retry) => {
                if !self.terminal_guard(&retry.delivery_id, event, anomalies) {
                    return;
                }
                let rejected_before = self.deliveries.get(&retry.delivery_id).is_some_and(|r| {
                    matches!(r.status, DeliveryStatus::Rejected | DeliveryStatus::RetryScheduled)
                });
                if !rejected_before {
                    anomalies.record(
                        AnomalyKind::RetryWithoutRejection,
                        event,
                        format!("Retry scheduled for {} without a rejection", retry.delivery_id),
                    );
                }
                let record = self
                    .deliveries
                    .entry(retry.delivery_id.clone())
                    .or_insert_with(|| {
                        DeliveryRecord::new(&retry.delivery_id, DeliveryStatus::RetryScheduled)
                    });
                if retry.attempt <= record.attempts {
                    anomalies.record(
                        AnomalyKind::AttemptRegression,
                        event,
                        format!(
                            "Attempt {} for {} does not advance past {}",
                            retry.attempt, retry.delivery_id, record.attempts
                        ),
                    );
                }
                record.status = DeliveryStatus::RetryScheduled;
                record.attempts = record.attempts.max(retry.attempt);
                record.last_backoff_ms = retry.backoff_ms;
            }
            DomainPayload::SyncDeadLettered(dead) => {
                if !self.terminal_guard(&dead.delivery_id, event, anomalies) {
                    return;
                }
                let record = self
                    .deliveries
                    .entry(dead.delivery_id.clone())
                    .or_insert_with(|| {
                        DeliveryRecord::new(&dead.delivery_id, DeliveryStatus::DeadLettered)
                    });
                record.status = DeliveryStatus::DeadLettered;
                record.attempts = record.attempts.max(dead.attempts);
                record.dead_letter_reason = Some(dead.reason.clone());
            }
            _ => {}
        }
    }

    fn freeze(self, summary: ReductionSummary) -> SyncSnapshot {
        let mut totals = SyncTotals::default();
        for record in self.deliveries.values() {
            match record.status {
                DeliveryStatus::Accepted => totals.accepted += 1,
                DeliveryStatus::Rejected => totals.rejected += 1,
                DeliveryStatus::RetryScheduled => totals.retry_scheduled += 1,
                DeliveryStatus::DeadLettered => totals.dead_lettered += 1,
            }
            totals.retries += u64::from(record.attempts);
        }

        SyncSnapshot {
            deliveries: self.deliveries,
            totals,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

pub fn reduce_sync_events<'a, I>(events: I) -> SyncSnapshot
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<SyncProjection, _>(events)
}
