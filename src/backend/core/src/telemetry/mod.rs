//! Telemetry: structured logging and metric descriptions.
//!
//! - **Logging**: JSON/pretty/compact output through `tracing-subscriber`
//! - **Metrics**: counters and histograms named and described through the
//!   `metrics` facade; installing an exporter is left to the host process
//!
//! # Example
//!
//! ```rust,no_run
//! use missionlog_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! init_telemetry(&config).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEventConfig};
pub use metrics::describe_metrics;

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "missionlog".to_string()
}

fn default_environment() -> String {
    std::env::var("MISSIONLOG_ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

/// Initialize logging and register metric descriptions.
///
/// Call once at process startup.
///
/// # Errors
///
/// Returns an error if the log filter is invalid or a global subscriber is
/// already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.logging, &config.environment)?;
    describe_metrics();

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "missionlog");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: TelemetryConfig =
            serde_json::from_str(r#"{"logging": {"format": "compact"}}"#).unwrap();
        assert_eq!(config.service_name, "missionlog");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }
}
