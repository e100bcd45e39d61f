//! Grow-only set and counter merges over event payloads.
//!
//! Both merges are commutative, associative and idempotent under
//! event-level duplication: inputs are deduplicated by `event_id` before
//! anything is folded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::events::Event;
use crate::ordering::canonicalize;

// =============================================================================
// G-Set (Grow-Only Set)
// =============================================================================

/// A grow-only set. Elements can be added but never removed.
///
/// Backed by a `BTreeSet` so iteration order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GSet<T: Ord + Clone> {
    elements: BTreeSet<T>,
}

impl<T: Ord + Clone> GSet<T> {
    pub fn new() -> Self {
        Self {
            elements: BTreeSet::new(),
        }
    }

    /// Insert an element.
    pub fn insert(&mut self, element: T) {
        self.elements.insert(element);
    }

    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }

    /// Merge with another GSet (set union).
    pub fn merge(&mut self, other: &GSet<T>) {
        self.elements.extend(other.elements.iter().cloned());
    }
}

impl<T: Ord + Clone> Default for GSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> FromIterator<T> for GSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<T: Ord + Clone> Extend<T> for GSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.elements.extend(iter);
    }
}

// =============================================================================
// Event merges
// =============================================================================

fn element_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Union of every value under `field` across the given events.
///
/// Arrays contribute each element; a scalar contributes itself; a missing or
/// `null` field contributes nothing. Non-string elements are stored as their
/// JSON text.
pub fn merge_gset<'a, I>(events: I, field: &str) -> GSet<String>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut set = GSet::new();
    for event in canonicalize(events) {
        match event.payload.get(field) {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Array(items)) => {
                set.extend(items.iter().filter(|v| !v.is_null()).map(element_text));
            }
            Some(scalar) => set.insert(element_text(scalar)),
        }
    }
    set
}

/// Sum of the integer deltas under `field`, one per distinct `event_id`.
///
/// Missing or non-integer values count as zero. The sum saturates instead of
/// wrapping.
pub fn merge_counter<'a, I>(events: I, field: &str) -> i64
where
    I: IntoIterator<Item = &'a Event>,
{
    canonicalize(events)
        .into_iter()
        .filter_map(|event| event.payload.get(field).and_then(|v| v.as_i64()))
        .fold(0i64, |total, delta| total.saturating_add(delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, payload: serde_json::Value) -> Event {
        Event::builder("ConnectorProvisioned", "c1")
            .with_event_id(id)
            .with_node("n")
            .lamport_clock(1)
            .with_payload_value(payload)
            .build()
    }

    // -------------------------------------------------------------------------
    // GSet tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_gset_merge_union() {
        let mut set_a: GSet<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
        let set_b: GSet<String> = ["y", "z"].iter().map(|s| s.to_string()).collect();

        set_a.merge(&set_b);
        let items: Vec<_> = set_a.iter().cloned().collect();
        assert_eq!(items, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_gset_merge_idempotent() {
        let mut set_a = GSet::new();
        set_a.insert(1);
        let set_b = set_a.clone();
        set_a.merge(&set_b);
        assert_eq!(set_a.len(), 1);
    }

    // -------------------------------------------------------------------------
    // Event merge tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_merge_gset_accepts_lists_and_scalars() {
        let events = vec![
            event("e1", json!({"scopes": ["read", "write"]})),
            event("e2", json!({"scopes": "admin"})),
            event("e3", json!({"other": true})),
            event("e4", json!({"scopes": [7, null]})),
        ];

        let merged = merge_gset(&events, "scopes");
        let items: Vec<_> = merged.iter().cloned().collect();
        assert_eq!(items, vec!["7", "admin", "read", "write"]);
    }

    #[test]
    fn test_merge_counter_ignores_duplicate_ids() {
        let first = event("e1", json!({"delta": 5}));
        let events = vec![
            first.clone(),
            event("e2", json!({"delta": 3})),
            Event {
                payload: json!({"delta": -3}),
                ..first
            },
        ];

        assert_eq!(merge_counter(&events, "delta"), 8);
        assert_eq!(merge_counter(events.iter().rev(), "delta"), 8);
    }

    #[test]
    fn test_merge_counter_missing_and_non_integer_are_zero() {
        let events = vec![
            event("e1", json!({"delta": -4})),
            event("e2", json!({})),
            event("e3", json!({"delta": "ten"})),
            event("e4", json!({"delta": 1.5})),
        ];
        assert_eq!(merge_counter(&events, "delta"), -4);
    }
}
