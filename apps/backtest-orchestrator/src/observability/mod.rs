//! Observability module for metrics.
//!
//! Prometheus metrics export for the scheduler, the engine runs and the
//! result parser. Tracing setup lives in [`crate::telemetry`].

mod metrics;

pub use self::metrics::{
    MetricsConfig, MetricsError, init_metrics, record_engine_run, record_parse_fallback,
    record_task_finished, record_task_submitted, update_task_gauges,
};
