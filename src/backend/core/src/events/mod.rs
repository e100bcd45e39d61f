//! Event model
//!
//! - **`event`**: the immutable `Event` envelope, `EventId` and the builder.
//! - **`kind`**: the closed `EventKind` catalog and its `Domain` routing.
//! - **`payload`**: typed payloads and the exhaustive `DomainPayload` decoder.
//! - **`validation`**: the payload validation collaborator.
//! - **`store`**: the `EventStore` collaborator with in-memory and JSON-lines adapters.

pub mod event;
pub mod kind;
pub mod payload;
pub mod store;
pub mod validation;

pub use event::{Event, EventBuilder, EventId, SCHEMA_VERSION};
pub use kind::{Domain, EventKind};
pub use payload::{DomainPayload, Lane};
pub use store::{read_jsonl, EventStore, InMemoryEventStore, JsonlEventStore};
pub use validation::{
    validate_event, validate_event_with, CatalogValidator, FieldViolation, PayloadValidator,
    ValidationReport, ViolationKind,
};
