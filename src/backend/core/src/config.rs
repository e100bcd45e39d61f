//! Configuration management.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::MissionLogError;
use crate::merge::StatePriority;
use crate::telemetry::TelemetryConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and metrics configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Lamport clock configuration
    #[serde(default)]
    pub clock: ClockConfig,

    /// Event store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Conflict merge configuration
    #[serde(default)]
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Identity stamped on events produced by this process
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// JSON document holding persisted clock values
    #[serde(default = "default_clock_path")]
    pub state_path: PathBuf,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            state_path: default_clock_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Append-only JSON-lines event log
    #[serde(default = "default_events_path")]
    pub events_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            events_path: default_events_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    /// Payload field naming the resulting state
    #[serde(default = "default_state_field")]
    pub state_field: String,

    /// Field consulted when `state_field` is missing
    #[serde(default = "default_fallback_field")]
    pub fallback_field: Option<String>,

    /// State priorities; higher wins a concurrent merge
    #[serde(default = "default_priorities")]
    pub priorities: BTreeMap<String, i64>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            state_field: default_state_field(),
            fallback_field: default_fallback_field(),
            priorities: default_priorities(),
        }
    }
}

impl MergeConfig {
    pub fn state_priority(&self) -> StatePriority {
        StatePriority {
            priorities: self.priorities.clone(),
            state_field: self.state_field.clone(),
            fallback_field: self.fallback_field.clone(),
        }
    }
}

// Default value functions
fn default_node_id() -> String { "local".to_string() }
fn default_clock_path() -> PathBuf { PathBuf::from(".missionlog/clock.json") }
fn default_events_path() -> PathBuf { PathBuf::from(".missionlog/events.jsonl") }
fn default_state_field() -> String { "state".to_string() }
fn default_fallback_field() -> Option<String> { Some("to_lane".to_string()) }
fn default_priorities() -> BTreeMap<String, i64> { StatePriority::lane_defaults().priorities }

impl Config {
    /// Load configuration from the environment (`MISSIONLOG__SECTION__KEY`).
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MISSIONLOG").separator("__"))
            .build()
            .map_err(MissionLogError::from)?;

        let cfg: Config = config.try_deserialize().map_err(MissionLogError::from)?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MISSIONLOG").separator("__"))
            .build()
            .map_err(MissionLogError::from)?;

        let cfg: Config = config.try_deserialize().map_err(MissionLogError::from)?;
        Ok(cfg)
    }
}
