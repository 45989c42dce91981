//! Prometheus metrics for Strata.
//!
//! Metrics are recorded through the `metrics` facade; without an installed
//! recorder every call is a no-op.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strata_reloads_total` | Counter | `outcome` | Reload attempts by outcome |
//! | `strata_callback_errors_total` | Counter | `kind` | Callback failures |
//! | `strata_dispatch_duration_seconds` | Histogram | `event` | Synchronous dispatch latency |
//! | `strata_async_callbacks_in_flight` | Gauge | - | Background callbacks still running |
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_telemetry::metrics::{record_reload, ReloadOutcome};
//!
//! record_reload(ReloadOutcome::Changed);
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names.
pub mod names {
    /// Reload attempts, labelled by `outcome`.
    pub const RELOADS_TOTAL: &str = "strata_reloads_total";
    /// Callback failures, labelled by `kind`.
    pub const CALLBACK_ERRORS_TOTAL: &str = "strata_callback_errors_total";
    /// Synchronous dispatch latency, labelled by `event`.
    pub const DISPATCH_DURATION_SECONDS: &str = "strata_dispatch_duration_seconds";
    /// Background callbacks currently running.
    pub const ASYNC_CALLBACKS_IN_FLIGHT: &str = "strata_async_callbacks_in_flight";
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder.
    pub enabled: bool,

    /// Histogram buckets for dispatch duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ],
        }
    }
}

/// Handle for rendering recorded metrics.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Creates a registry around an existing handle.
    #[must_use]
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Returns the registry installed by [`init_metrics`], if any.
    #[must_use]
    pub fn global() -> Option<Self> {
        METRICS_HANDLE.get().cloned().map(Self::new)
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// Returns `None` when metrics are disabled. Calling this twice returns the
/// registry installed first.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` for empty buckets and
/// `TelemetryError::MetricsInit` when a different recorder is already
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(existing) = MetricsRegistry::global() {
        return Ok(Some(existing));
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::DISPATCH_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle.clone());
    register_metric_descriptions();

    Ok(Some(MetricsRegistry::new(handle)))
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::RELOADS_TOTAL, "Configuration reload attempts by outcome");
    describe_counter!(
        names::CALLBACK_ERRORS_TOTAL,
        "Callback failures by kind (handler, timeout, panic)"
    );
    describe_histogram!(
        names::DISPATCH_DURATION_SECONDS,
        "Time spent running synchronous callbacks for one event"
    );
    describe_gauge!(
        names::ASYNC_CALLBACKS_IN_FLIGHT,
        "Background callbacks that have not finished yet"
    );
}

/// Result of one reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The new value differs from the old one.
    Changed,
    /// Same checksum as before.
    Unchanged,
    /// Decoding, hooks or validation failed.
    Failed,
}

impl ReloadOutcome {
    /// Label value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

/// Records a reload attempt.
pub fn record_reload(outcome: ReloadOutcome) {
    counter!(names::RELOADS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

/// Records a callback failure of the given kind.
pub fn record_callback_error(kind: &'static str) {
    counter!(names::CALLBACK_ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Records how long the synchronous part of a dispatch took.
pub fn record_dispatch(event: &'static str, duration: Duration) {
    histogram!(names::DISPATCH_DURATION_SECONDS, "event" => event).record(duration.as_secs_f64());
}

/// Keeps the in-flight gauge raised while a background callback runs.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge; dropping the guard decrements it.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::ASYNC_CALLBACKS_IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::ASYNC_CALLBACKS_IN_FLIGHT).decrement(1.0);
    }
}
