//! Logging and OpenTelemetry export
//!
//! Sets up the process-wide `tracing` subscriber and, when a collector is
//! configured, the OTLP pipeline that [`OtelBackend`](crate::span::OtelBackend)
//! spans are exported through.
//!
//! ```text
//! testtrace → OTLP (gRPC) → OTel Collector → trace store
//!     └──► stderr (fmt layer, RUST_LOG filter)
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::InstrumentationConfig;

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,testtrace=debug";

/// Error setting up logging or export
#[derive(Debug)]
pub enum TelemetryError {
    Exporter(String),
    Subscriber(String),
}

impl std::fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryError::Exporter(e) => write!(f, "Failed to install OTLP exporter: {}", e),
            TelemetryError::Subscriber(e) => write!(f, "Failed to install log subscriber: {}", e),
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Flushes and shuts down the global tracer provider when dropped
#[derive(Debug)]
#[must_use = "dropping the guard shuts down span export"]
pub struct TelemetryGuard {
    otlp: bool,
}

impl TelemetryGuard {
    pub fn otlp_enabled(&self) -> bool {
        self.otlp
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.otlp {
            opentelemetry::global::shutdown_tracer_provider();
            tracing::info!("OpenTelemetry export shut down");
        }
    }
}

/// Initialize logging, plus OTLP export if `config.otlp_endpoint` is set.
///
/// With an endpoint this must run inside a Tokio runtime: the batch exporter
/// spawns its worker there.
///
/// # Example
/// ```ignore
/// let config = InstrumentationConfig::from_env();
/// let _guard = init_telemetry(&config)?;
/// ```
pub fn init_telemetry(config: &InstrumentationConfig) -> Result<TelemetryGuard, TelemetryError> {
    let otel_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", config.service_name.clone()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", uuid::Uuid::now_v7().to_string()),
                ])))
                .install_batch(runtime::Tokio)
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };
    let otlp = otel_layer.is_some();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        endpoint = config.otlp_endpoint.as_deref().unwrap_or("none"),
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { otlp })
}
