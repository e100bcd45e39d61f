//! Canonical ordering and deduplication.
//!
//! Every reducer starts here: an arbitrary finite multiset of events becomes
//! one duplicate-free sequence in a strict total order.
//!
//! Deduplication keeps, per `event_id`, the copy with the smallest
//! [`OrderKey`]. Copies with equal keys are ranked by their canonical JSON
//! text and the greater text wins, so the representative depends only on the
//! set of copies present, never on arrival order. Sorting before or after
//! deduplication yields the same sequence.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::events::{Event, EventId};

/// Total order key: Lamport clock, then node, then event id.
///
/// Distinct event ids never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey<'a> {
    pub lamport_clock: u64,
    pub node_id: &'a str,
    pub event_id: &'a EventId,
}

impl Event {
    pub fn order_key(&self) -> OrderKey<'_> {
        OrderKey {
            lamport_clock: self.lamport_clock,
            node_id: &self.node_id,
            event_id: &self.event_id,
        }
    }
}

/// Stable sort by [`OrderKey`].
pub fn sort_events(events: &mut [&Event]) {
    events.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}

// Object keys serialize sorted, so equal events give equal text.
fn canonical_text(event: &Event) -> String {
    serde_json::to_string(event).unwrap_or_default()
}

/// Whether `candidate` replaces `kept` as the representative of their id.
fn supersedes(candidate: &Event, kept: &Event) -> bool {
    match candidate.order_key().cmp(&kept.order_key()) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => candidate != kept && canonical_text(candidate) > canonical_text(kept),
    }
}

/// Keep one representative per `event_id`.
///
/// Representatives are returned in the order their ids first appear.
pub fn dedup_events<'a, I>(events: I) -> Vec<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut kept: Vec<&'a Event> = Vec::new();
    let mut index: HashMap<&'a EventId, usize> = HashMap::new();

    for event in events {
        match index.get(&event.event_id) {
            Some(&slot) => {
                if supersedes(event, kept[slot]) {
                    kept[slot] = event;
                }
            }
            None => {
                index.insert(&event.event_id, kept.len());
                kept.push(event);
            }
        }
    }

    kept
}

/// Sort then deduplicate: the canonical sequence every reducer folds.
pub fn canonicalize<'a, I>(events: I) -> Vec<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut sorted: Vec<&'a Event> = events.into_iter().collect();
    sort_events(&mut sorted);
    dedup_events(sorted)
}

/// SHA-256 over the canonical event ids, hex encoded.
///
/// Two inputs with the same set of event ids produce the same digest.
pub fn sequence_digest<'a, I>(events: I) -> String
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut hasher = Sha256::new();
    for event in canonicalize(events) {
        hasher.update(event.event_id.as_str().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
