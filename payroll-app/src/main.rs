//! # Payroll Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize logging and, when configured, OpenTelemetry export
//! - Initialize the repository adapter
//! - Create the payroll service
//! - Start the HTTP server

mod config;

use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::SdkMeterProvider, propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use payroll_hex::{PayrollService, inbound::HttpServer};
use payroll_repo::build_repo;

use config::{Config, LogFormat};

/// Providers kept alive for the process lifetime and flushed on exit.
struct Telemetry {
    tracer: sdktrace::Tracer,
    tracer_provider: sdktrace::SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl Telemetry {
    fn shutdown(self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            tracing::warn!("Failed to flush traces: {}", e);
        }
        if let Err(e) = self.meter_provider.shutdown() {
            tracing::warn!("Failed to flush metrics: {}", e);
        }
    }
}

fn init_telemetry(endpoint: &str) -> anyhow::Result<Telemetry> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let tracer_provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    // HTTP metrics from the router layer are recorded against this provider
    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();
    global::set_meter_provider(meter_provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok(Telemetry {
        tracer: tracer_provider.tracer("payroll-service"),
        tracer_provider,
        meter_provider,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    let telemetry = config
        .otlp_endpoint
        .as_deref()
        .map(init_telemetry)
        .transpose()?;
    let otel_layer = telemetry
        .as_ref()
        .map(|t| tracing_opentelemetry::layer().with_tracer(t.tracer.clone()));

    let (json_layer, pretty_layer) = match config.log_format {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(fmt::layer())),
    };

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,payroll_app=debug,payroll_hex=debug".into()),
        )
        .with(json_layer)
        .with(pretty_layer)
        .with(otel_layer)
        .init();

    tracing::info!("Starting payroll server on port {}", config.port);
    if let Some(endpoint) = &config.otlp_endpoint {
        tracing::info!("Exporting telemetry to {}", endpoint);
    }

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;
    tracing::info!(backend = repo.backend(), "Repository ready");

    // Create the payroll service
    let service = PayrollService::new(repo);

    // Create and run the HTTP server
    let server = HttpServer::new(service);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces and metrics are flushed before exit
    if let Some(telemetry) = telemetry {
        telemetry.shutdown();
    }
    Ok(())
}
