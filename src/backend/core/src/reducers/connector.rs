//! Connector lifecycle reducer.
//!
//! Per connector: `provisioned → healthy ⇄ degraded → revoked →
//! decommissioned`. Granted scopes only ever grow.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Anomaly, AnomalyKind, AnomalyLog, Projection, ReductionSummary};
use crate::events::{Domain, DomainPayload, Event, EventId, EventKind};
use crate::merge::GSet;

pub const EVENT_TYPES: &[EventKind] = &[
    EventKind::ConnectorProvisioned,
    EventKind::ConnectorHealthChecked,
    EventKind::ConnectorDegraded,
    EventKind::ConnectorRecovered,
    EventKind::ConnectorRevoked,
    EventKind::ConnectorDecommissioned,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    Provisioned,
    Healthy,
    Degraded,
    Revoked,
    Decommissioned,
}

impl ConnectorStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioned => "provisioned",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Revoked => "revoked",
            Self::Decommissioned => "decommissioned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorRecord {
    pub connector_id: String,
    pub provider: Option<String>,
    pub status: ConnectorStatus,
    pub scopes: GSet<String>,
    /// Unhealthy checks since the last healthy check or recovery
    pub consecutive_failures: u32,
    pub last_latency_ms: Option<u64>,
    pub degraded_reason: Option<String>,
    pub revoked_reason: Option<String>,
    pub last_event_id: EventId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSnapshot {
    pub connectors: BTreeMap<String, ConnectorRecord>,
    pub event_count: usize,
    pub anomalies: Vec<Anomaly>,
    pub last_event_id: Option<EventId>,
}

impl ConnectorSnapshot {
    pub fn status_of(&self, connector_id: &str) -> Option<ConnectorStatus> {
        self.connectors.get(connector_id).map(|c| c.status)
    }

    /// Connectors that can currently serve traffic.
    pub fn usable(&self) -> impl Iterator<Item = &ConnectorRecord> {
        self.connectors.values().filter(|c| {
            matches!(
                c.status,
                ConnectorStatus::Provisioned | ConnectorStatus::Healthy | ConnectorStatus::Degraded
            )
        })
    }
}

#[derive(Debug, Default)]
struct ConnectorProjection {
    connectors: BTreeMap<String, ConnectorRecord>,
}

fn connector_id(payload: &DomainPayload) -> Option<&str> {
    match payload {
        DomainPayload::ConnectorProvisioned(p) => Some(&p.connector_id),
        DomainPayload::ConnectorHealthChecked(p) => Some(&p.connector_id),
        DomainPayload::ConnectorDegraded(p) => Some(&p.connector_id),
        DomainPayload::ConnectorRecovered(p) => Some(&p.connector_id),
        DomainPayload::ConnectorRevoked(p) => Some(&p.connector_id),
        DomainPayload::ConnectorDecommissioned(p) => Some(&p.connector_id),
        _ => None,
    }
}

impl Projection for ConnectorProjection {
    type Snapshot = ConnectorSnapshot;

    const DOMAIN: Domain = Domain::Connector;
    const EVENT_TYPES: &'static [EventKind] = EVENT_TYPES;

    fn apply(&mut self, event: &Event, payload: &DomainPayload, anomalies: &mut AnomalyLog) {
        let Some(id) = connector_id(payload) else {
            return;
        };

        if let DomainPayload::ConnectorProvisioned(provisioned) = payload {
            if let Some(existing) = self.connectors.get_mut(id) {
                anomalies.record(
                    AnomalyKind::DuplicateStart,
                    event,
                    format!("Connector {} provisioned twice", id),
                );
                existing.scopes.extend(provisioned.scopes.iter().cloned());
                return;
            }
            self.connectors.insert(
                id.to_string(),
                ConnectorRecord {
                    connector_id: id.to_string(),
                    provider: Some(provisioned.provider.clone()),
                    status: ConnectorStatus::Provisioned,
                    scopes: provisioned.scopes.iter().cloned().collect(),
                    consecutive_failures: 0,
                    last_latency_ms: None,
                    degraded_reason: None,
                    revoked_reason: None,
                    last_event_id: event.event_id.clone(),
                },
            );
            return;
        }

        if !self.connectors.contains_key(id) {
            anomalies.record(
                AnomalyKind::EventBeforeProvisioned,
                event,
                format!("{} for unprovisioned connector {}", event.event_type, id),
            );
        }
        let record = self
            .connectors
            .entry(id.to_string())
            .or_insert_with(|| ConnectorRecord {
                connector_id: id.to_string(),
                provider: None,
                status: ConnectorStatus::Provisioned,
                scopes: GSet::new(),
                consecutive_failures: 0,
                last_latency_ms: None,
                degraded_reason: None,
                revoked_reason: None,
                last_event_id: event.event_id.clone(),
            });

        match record.status {
            ConnectorStatus::Decommissioned => {
                anomalies.record(
                    AnomalyKind::EventAfterTerminal,
                    event,
                    format!("{} after connector {} was decommissioned", event.event_type, id),
                );
                return;
            }
            ConnectorStatus::Revoked
                if !matches!(payload, DomainPayload::ConnectorDecommissioned(_)) =>
            {
                anomalies.record(
                    AnomalyKind::InvalidTransition,
                    event,
                    format!("{} on revoked connector {}", event.event_type, id),
                );
                return;
            }
            _ => {}
        }

        match payload {
            DomainPayload::ConnectorHealthChecked(check) => {
                record.last_latency_ms = check.latency_ms;
                if check.healthy {
                    record.status = ConnectorStatus::Healthy;
                    record.consecutive_failures = 0;
                    record.degraded_reason = None;
                } else {
                    record.status = ConnectorStatus::Degraded;
                    record.consecutive_failures = record.consecutive_failures.saturating_add(1);
                }
            }
            DomainPayload::ConnectorDegraded(degraded) => {
                record.status = ConnectorStatus::Degraded;
                record.degraded_reason = degraded.reason.clone();
            }
            DomainPayload::ConnectorRecovered(_) => {
                if record.status != ConnectorStatus::Degraded {
                    anomalies.record(
                        AnomalyKind::InvalidTransition,
                        event,
                        format!("Connector {} recovered while {}", id, record.status.as_str()),
                    );
                }
                record.status = ConnectorStatus::Healthy;
                record.consecutive_failures = 0;
                record.degraded_reason = None;
            }
            DomainPayload::ConnectorRevoked(revoked) => {
                record.status = ConnectorStatus::Revoked;
                record.revoked_reason = revoked.reason.clone();
            }
            DomainPayload::ConnectorDecommissioned(_) => {
                if record.status != ConnectorStatus::Revoked {
                    anomalies.record(
                        AnomalyKind::InvalidTransition,
                        event,
                        format!(
                            "Connector {} decommissioned while {}",
                            id,
                            record.status.as_str()
                        ),
                    );
                }
                record.status = ConnectorStatus::Decommissioned;
            }
            _ => {}
        }
        record.last_event_id = event.event_id.clone();
    }

    fn freeze(self, summary: ReductionSummary) -> ConnectorSnapshot {
        ConnectorSnapshot {
            connectors: self.connectors,
            event_count: summary.event_count,
            anomalies: summary.anomalies,
            last_event_id: summary.last_event_id,
        }
    }
}

pub fn reduce_connector_events<'a, I>(events: I) -> ConnectorSnapshot
where
    I: IntoIterator<Item = &'a Event>,
{
    super::reduce::<ConnectorProjection, _>(events)
}
