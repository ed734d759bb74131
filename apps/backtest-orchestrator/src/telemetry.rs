//! Tracing and OpenTelemetry setup.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives; falls back to `observability.logging.level`
//! - `OTEL_ENABLED`: Set to "true" to export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: backtest-orchestrator)
//!
//! # Usage
//!
//! ```ignore
//! use backtest_orchestrator::telemetry::{self, TelemetryConfig};
//!
//! // Keep the guard alive for the duration of the program
//! let _guard = telemetry::init_with_config(&config.observability.logging, TelemetryConfig::from_env());
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Service name for OpenTelemetry traces.
const DEFAULT_SERVICE_NAME: &str = "backtest-orchestrator";

/// Default OTLP endpoint.
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Guard that shuts down OpenTelemetry when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether OpenTelemetry export is enabled.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let enabled = std::env::var("OTEL_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());

        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

        Self {
            enabled,
            otlp_endpoint,
            service_name,
        }
    }
}

/// Initialize telemetry with configuration from the environment.
#[must_use]
pub fn init(logging: &LoggingConfig) -> TelemetryGuard {
    init_with_config(logging, TelemetryConfig::from_env())
}

/// Initialize telemetry with custom configuration.
///
/// Falls back to console-only logging when the OTLP exporter cannot be built.
/// Calling this twice leaves the first subscriber in place.
#[must_use]
pub fn init_with_config(logging: &LoggingConfig, config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level))
        .add_directive(quiet_directive("h2"))
        .add_directive(quiet_directive("tonic"))
        .add_directive(quiet_directive("hyper"));

    let json = logging.format == "json";
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let pretty_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    let tracer_provider = if config.enabled {
        build_tracer_provider(&config)
    } else {
        None
    };
    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(otel_layer)
        .try_init()
        .is_ok();

    if installed && tracer_provider.is_some() {
        tracing::info!(
            service_name = %config.service_name,
            endpoint = %config.otlp_endpoint,
            "OpenTelemetry initialized"
        );
    }

    TelemetryGuard { tracer_provider }
}

fn build_tracer_provider(config: &TelemetryConfig) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("Failed to create OTLP exporter: {e:?}, falling back to console logging");
            return None;
        }
    };

    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                opentelemetry_sdk::Resource::builder()
                    .with_service_name(config.service_name.clone())
                    .build(),
            )
            .build(),
    )
}

#[allow(clippy::expect_used)] // Directive strings are compile-time constants
fn quiet_directive(target: &'static str) -> tracing_subscriber::filter::Directive {
    format!("{target}=warn")
        .parse()
        .expect("static warn directive is valid")
}

// =============================================================================
// Tests
// =============================================================================
