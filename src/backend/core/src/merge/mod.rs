//! Conflict detection and merge primitives.
//!
//! - **`conflict`**: concurrency predicate, conflict grouping, causal
//!   topological sort and the priority-driven state-machine merge.
//! - **`crdt`**: grow-only set and counter merges over event payloads.

pub mod conflict;
pub mod crdt;

pub use conflict::{
    find_conflicts, is_concurrent, state_machine_merge, topological_sort, MergeResolution,
    StatePriority,
};
pub use crdt::{merge_counter, merge_gset, GSet};
