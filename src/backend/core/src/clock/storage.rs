//! Clock storage collaborator and reference adapters.
//!
//! Storage is the boundary that rejects negative clock values; the clock
//! logic itself never checks.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::error::{ErrorCode, ErrorContext, MissionLogError, Result};

/// Persists one integer per node.
pub trait ClockStorage: Send + Sync {
    /// Last saved value for `node_id`, or 0 when nothing was saved.
    fn load(&self, node_id: &str) -> Result<i64>;

    /// Durably record `value` for `node_id`.
    ///
    /// # Errors
    ///
    /// `InvalidClockValue` when `value` is negative.
    fn save(&self, node_id: &str, value: i64) -> Result<()>;
}

fn ensure_non_negative(node_id: &str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(MissionLogError::invalid_clock_value(node_id, value));
    }
    Ok(())
}

/// Process-local clock storage.
#[derive(Debug, Default)]
pub struct InMemoryClockStorage {
    values: RwLock<HashMap<String, i64>>,
}

impl InMemoryClockStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockStorage for InMemoryClockStorage {
    fn load(&self, node_id: &str) -> Result<i64> {
        Ok(self.values.read().get(node_id).copied().unwrap_or(0))
    }

    fn save(&self, node_id: &str, value: i64) -> Result<()> {
        ensure_non_negative(node_id, value)?;
        self.values.write().insert(node_id.to_string(), value);
        Ok(())
    }
}

/// Clock storage backed by one JSON document mapping node id to value.
///
/// Saves rewrite the whole document to a sibling temp file and rename it
/// over the original, so readers never observe a torn write.
#[derive(Debug)]
pub struct FileClockStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileClockStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, i64>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path).with_error_code(ErrorCode::ClockStorageFailed)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            MissionLogError::from(e).with_context("path", self.path.display().to_string())
        })
    }
}

impl ClockStorage for FileClockStorage {
    fn load(&self, node_id: &str) -> Result<i64> {
        Ok(self.read_all()?.get(node_id).copied().unwrap_or(0))
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn save(&self, node_id: &str, value: i64) -> Result<()> {
        ensure_non_negative(node_id, value)?;

        let _guard = self.write_lock.lock();
        let mut values = self.read_all()?;
        values.insert(node_id.to_string(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_error_code(ErrorCode::ClockStorageFailed)?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&values)?)
            .with_error_code(ErrorCode::ClockStorageFailed)?;
        fs::rename(&tmp, &self.path).with_error_code(ErrorCode::ClockStorageFailed)?;

        tracing::trace!("Clock value persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_defaults_to_zero() {
        let storage = InMemoryClockStorage::new();
        assert_eq!(storage.load("node").unwrap(), 0);
        storage.save("node", 4).unwrap();
        assert_eq!(storage.load("node").unwrap(), 4);
    }

    #[test]
    fn test_negative_values_rejected() {
        let storage = InMemoryClockStorage::new();
        let err = storage.save("node", -1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidClockValue);
        assert_eq!(storage.load("node").unwrap(), 0);
    }

    #[test]
    fn test_file_storage_persists_per_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock.json");

        let storage = FileClockStorage::new(&path);
        storage.save("a", 3).unwrap();
        storage.save("b", 8).unwrap();

        let reopened = FileClockStorage::new(&path);
        assert_eq!(reopened.load("a").unwrap(), 3);
        assert_eq!(reopened.load("b").unwrap(), 8);
        assert_eq!(reopened.load("c").unwrap(), 0);
        assert!(FileClockStorage::new(&path).save("a", -5).is_err());
    }
}
