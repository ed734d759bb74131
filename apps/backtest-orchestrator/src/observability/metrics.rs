//! Prometheus metrics for the orchestrator.
//!
//! Recording functions are cheap no-ops until [`init_metrics`] installs the
//! exporter, so library code records unconditionally.
//!
//! # Example
//!
//! ```ignore
//! use backtest_orchestrator::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_task_submitted("evaluation");
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Default exporter port.
const DEFAULT_METRICS_PORT: u16 = 9464;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for engine run durations (in seconds).
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_METRICS_PORT)),
            // Engine runs take from under a second to an hour
            duration_buckets: vec![
                0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Create a metrics configuration with a custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.duration_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Scheduler Metrics
// ============================================================================

/// Record a task submission.
pub fn record_task_submitted(kind: &str) {
    counter!("orchestrator_tasks_submitted_total", "kind" => kind.to_string()).increment(1);
}

/// Record a task reaching a terminal state.
///
/// # Arguments
///
/// * `kind` - Task kind label ("evaluation", "parameter_search")
/// * `status` - Terminal status ("completed", "failed", "cancelled")
pub fn record_task_finished(kind: &str, status: &str) {
    counter!(
        "orchestrator_tasks_finished_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Update the running and queued task gauges.
#[allow(clippy::cast_precision_loss)]
pub fn update_task_gauges(running: usize, queued: usize) {
    gauge!("orchestrator_tasks_running").set(running as f64);
    gauge!("orchestrator_tasks_queued").set(queued as f64);
}

// ============================================================================
// Engine Metrics
// ============================================================================

/// Record one engine process run.
///
/// # Arguments
///
/// * `kind` - Task kind label
/// * `outcome` - "success", "exit_error", "timeout", "cancelled", "spawn_error"
/// * `seconds` - Wall-clock duration from spawn to exit
pub fn record_engine_run(kind: &str, outcome: &str, seconds: f64) {
    histogram!(
        "orchestrator_engine_run_seconds",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .record(seconds);
}

/// Record a parser falling back to partial output.
pub fn record_parse_fallback(source: &str) {
    counter!("orchestrator_parse_fallbacks_total", "source" => source.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert_eq!(config.listen_addr.port(), 9464);
        assert!(config.duration_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9100".parse().unwrap();
        let config = MetricsConfig::with_addr(addr);
        assert_eq!(config.listen_addr, addr);
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_task_submitted("evaluation");
        record_task_finished("evaluation", "completed");
        update_task_gauges(2, 5);
        record_engine_run("evaluation", "success", 1.5);
        record_parse_fallback("export_ignored");
    }
}
