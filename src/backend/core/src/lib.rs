#![allow(clippy::result_large_err)]
//! # MissionLog Core
//!
//! Event-sourcing substrate for multi-agent mission tracking.
//!
//! ## Architecture
//!
//! - **Events**: Immutable envelope, closed event catalog, typed payloads and validation
//! - **Ordering**: Canonical total order, deduplication and sequence digests
//! - **Clock**: Per-node Lamport clocks over pluggable storage
//! - **Merge**: Concurrency detection, causal sort, priority merge and CRDT merges
//! - **Reducers**: Deterministic folds from event sets to frozen domain snapshots
//! - **Telemetry**: Structured logging and metric descriptions

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod merge;
pub mod ordering;
pub mod reducers;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, MissionLogError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{
        ClockRegistry, ClockStorage, FileClockStorage, InMemoryClockStorage, LamportClock,
    };
    pub use crate::error::{
        ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, MissionLogError, Result,
    };
    pub use crate::events::{
        read_jsonl, validate_event, CatalogValidator, Domain, DomainPayload, Event,
        EventBuilder, EventId, EventKind, EventStore, InMemoryEventStore, JsonlEventStore, Lane,
        PayloadValidator, ValidationReport,
    };
    pub use crate::merge::{
        find_conflicts, is_concurrent, merge_counter, merge_gset, state_machine_merge,
        topological_sort, GSet, MergeResolution, StatePriority,
    };
    pub use crate::ordering::{canonicalize, dedup_events, sequence_digest, sort_events, OrderKey};
    pub use crate::reducers::{
        reduce_collaboration_events, reduce_connector_events, reduce_decision_point_events,
        reduce_glossary_events, reduce_lifecycle_events, reduce_mission_audit_events,
        reduce_mission_next_events, reduce_status_events, reduce_sync_events, Anomaly,
        AnomalyKind, CollaborationState, ConnectorSnapshot, DecisionPointSnapshot,
        GlossaryState, MissionAuditState, MissionLifecycleState, MissionNextState,
        StatusSnapshot, SyncSnapshot,
    };
}
