//! Lamport logical clock.
//!
//! One non-negative counter per node, persisted through a [`ClockStorage`]
//! before any new value is returned. Mutations on one node are serialized by
//! a per-clock mutex. Clocks are only obtained through a [`ClockRegistry`],
//! which hands out a single shared clock per node, so every caller in the
//! process contends on the same lock. Use one registry per storage.

pub mod storage;

pub use storage::{ClockStorage, FileClockStorage, InMemoryClockStorage};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

use crate::error::{MissionLogError, Result};
use crate::telemetry::metrics::ClockMetrics;

/// Per-node Lamport clock.
pub struct LamportClock {
    node_id: String,
    storage: Arc<dyn ClockStorage>,
    lock: Mutex<()>,
}

impl fmt::Debug for LamportClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LamportClock")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl LamportClock {
    pub(crate) fn new(node_id: impl Into<String>, storage: Arc<dyn ClockStorage>) -> Self {
        Self {
            node_id: node_id.into(),
            storage,
            lock: Mutex::new(()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Advance by one, persist, and return the new value.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub fn tick(&self) -> Result<u64> {
        let _guard = self.lock.lock();
        let current = self.storage.load(&self.node_id)?;
        let next = self.advance(current)?;
        self.storage.save(&self.node_id, next)?;
        ClockMetrics::tick();
        tracing::trace!(value = next, "Clock ticked");
        self.to_u64(next)
    }

    /// Catch up with a remote clock: `max(local, remote) + 1`.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub fn update(&self, remote_clock: u64) -> Result<u64> {
        let remote = i64::try_from(remote_clock)
            .map_err(|_| MissionLogError::invalid_clock_value(&self.node_id, remote_clock))?;

        let _guard = self.lock.lock();
        let current = self.storage.load(&self.node_id)?;
        let next = self.advance(current.max(remote))?;
        self.storage.save(&self.node_id, next)?;
        ClockMetrics::update();
        tracing::trace!(remote = remote_clock, value = next, "Clock updated");
        self.to_u64(next)
    }

    /// Persisted value, without mutation.
    pub fn current(&self) -> Result<u64> {
        let value = self.storage.load(&self.node_id)?;
        self.to_u64(value)
    }

    fn advance(&self, value: i64) -> Result<i64> {
        value
            .checked_add(1)
            .ok_or_else(|| MissionLogError::invalid_clock_value(&self.node_id, "i64 overflow"))
    }

    fn to_u64(&self, value: i64) -> Result<u64> {
        u64::try_from(value).map_err(|_| MissionLogError::invalid_clock_value(&self.node_id, value))
    }
}

/// Shares one [`LamportClock`] per node over a common storage.
///
/// Two registries over the same storage do not serialize against each other.
pub struct ClockRegistry {
    storage: Arc<dyn ClockStorage>,
    clocks: DashMap<String, Arc<LamportClock>>,
}

impl ClockRegistry {
    pub fn new(storage: Arc<dyn ClockStorage>) -> Self {
        Self {
            storage,
            clocks: DashMap::new(),
        }
    }

    /// The clock for `node_id`, created on first use.
    pub fn clock(&self, node_id: &str) -> Arc<LamportClock> {
        if let Some(clock) = self.clocks.get(node_id) {
            return Arc::clone(clock.value());
        }
        let clock = self
            .clocks
            .entry(node_id.to_string())
            .or_insert_with(|| Arc::new(LamportClock::new(node_id, Arc::clone(&self.storage))));
        Arc::clone(clock.value())
    }

    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.clocks.iter().map(|e| e.key().clone()).collect();
        nodes.sort();
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn clock() -> LamportClock {
        LamportClock::new("node-a", Arc::new(InMemoryClockStorage::new()))
    }

    #[test]
    fn test_tick_and_update_sequence() {
        let clock = clock();
        assert_eq!(clock.current().unwrap(), 0);
        assert_eq!(clock.tick().unwrap(), 1);
        assert_eq!(clock.update(5).unwrap(), 6);
        assert_eq!(clock.update(3).unwrap(), 7);
        assert_eq!(clock.current().unwrap(), 7);
    }

    #[test]
    fn test_update_rejects_remote_beyond_i64() {
        let err = clock().update(u64::MAX).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidClockValue);
    }

    #[test]
    fn test_tick_overflow_is_an_error() {
        let storage = Arc::new(InMemoryClockStorage::new());
        storage.save("node-a", i64::MAX).unwrap();
        let clock = LamportClock::new("node-a", storage);

        assert_eq!(clock.tick().unwrap_err().code(), ErrorCode::InvalidClockValue);
        assert_eq!(clock.current().unwrap(), i64::MAX as u64);
    }

    #[test]
    fn test_registry_shares_clock_per_node() {
        let registry = ClockRegistry::new(Arc::new(InMemoryClockStorage::new()));
        let a1 = registry.clock("a");
        let a2 = registry.clock("a");
        let b = registry.clock("b");

        assert!(Arc::ptr_eq(&a1, &a2));
        a1.tick().unwrap();
        assert_eq!(a2.current().unwrap(), 1);
        assert_eq!(b.current().unwrap(), 0);
        assert_eq!(registry.nodes(), vec!["a".to_string(), "b".to_string()]);
    }
}
