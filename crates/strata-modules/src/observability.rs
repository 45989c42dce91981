//! Logging and metrics settings carried in the application document.

use serde::{Deserialize, Serialize};
use strata_core::{Configurable, Schema};
use strata_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

/// Prometheus scrape endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct MetricsSection {
    /// Whether metrics are recorded.
    #[serde(with = "strata_core::de::boolish")]
    #[config(no_merge)]
    pub enabled: bool,

    /// Scrape port.
    #[config(min = 1, max = 65535)]
    pub port: i32,

    /// Scrape path.
    #[config(required)]
    pub path: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9100,
            path: "/metrics".to_string(),
        }
    }
}

impl Configurable for MetricsSection {}

/// Observability module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Minimum level.
    #[config(one_of = "trace debug info warn error")]
    pub log_level: String,

    /// `json` or `pretty`.
    #[config(one_of = "json pretty")]
    pub log_format: String,

    /// Trace sampling ratio.
    #[config(min = 0, max = 1)]
    #[config(no_merge)]
    pub sample_ratio: f64,

    /// Metrics endpoint.
    #[config(nested)]
    pub metrics: MetricsSection,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            sample_ratio: 1.0,
            metrics: MetricsSection::default(),
        }
    }
}

impl Configurable for ObservabilityConfig {}

impl ObservabilityConfig {
    /// Telemetry settings for `strata_telemetry::init_telemetry`.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let logging = if self.log_format == "pretty" {
            LogConfig::development()
        } else {
            LogConfig::production()
        };
        TelemetryConfig {
            logging: logging.with_level(self.log_level.clone()),
            metrics: MetricsConfig {
                enabled: self.metrics.enabled,
                ..MetricsConfig::default()
            },
        }
    }
}
