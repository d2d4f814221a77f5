//! OpenTelemetry initialization and trace propagation.
//!
//! With an OTLP endpoint configured, traces, logs and metrics are exported
//! over gRPC. Without one, the worker logs to stdout only.

use std::time::Duration;

use anyhow::{Context, Result};
use harmonconf::TelemetryConfig;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Timeout for OTLP exports - prevents blocking on unavailable endpoints
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info,harmonai=debug"))
}

/// Initialize logging, plus OTLP export when an endpoint is configured.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    if config.otlp_endpoint.is_empty() {
        tracing_subscriber::registry()
            .with(env_filter(&config.log_level))
            .with(tracing_subscriber::fmt::layer())
            .init();
        tracing::info!("📝 Logging to stdout (no OTLP endpoint configured)");
        return Ok(());
    }

    let resource = Resource::builder_empty()
        .with_service_name("harmonai")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let endpoint = if config.otlp_endpoint.starts_with("http") {
        config.otlp_endpoint.clone()
    } else {
        format!("http://{}", config.otlp_endpoint)
    };

    // 1. Traces
    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP span exporter")?;

    let batch_span_processor =
        opentelemetry_sdk::trace::BatchSpanProcessor::builder(trace_exporter).build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_span_processor(batch_span_processor)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let tracer = tracer_provider.tracer("harmonai");
    global::set_tracer_provider(tracer_provider);

    // 2. Logs
    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP log exporter")?;

    let log_processor = opentelemetry_sdk::logs::BatchLogProcessor::builder(log_exporter).build();

    let logger_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
        .with_log_processor(log_processor)
        .with_resource(resource.clone())
        .build();

    // 3. Metrics
    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP metric exporter")?;

    let metric_reader =
        opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter).build();

    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(metric_reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(meter_provider);

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let log_appender =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&logger_provider);

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .with(log_appender)
        .init();

    tracing::info!(
        "🔭 OpenTelemetry initialized with OTLP endpoint: {}",
        config.otlp_endpoint
    );

    Ok(())
}

/// Stdout-only logging for one-shot CLI commands.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Providers flush on drop with the export timeout above.
pub fn shutdown() -> Result<()> {
    tracing::info!("🔭 Shutting down telemetry...");
    Ok(())
}

/// W3C traceparent for the current span, if it has a valid context.
pub fn current_traceparent() -> Option<String> {
    use opentelemetry::trace::TraceContextExt;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    let context = tracing::Span::current().context();
    let span = context.span();
    let span_context = span.span_context();

    if span_context.is_valid() {
        let flags = if span_context.is_sampled() { "01" } else { "00" };
        Some(format!(
            "00-{}-{}-{}",
            span_context.trace_id(),
            span_context.span_id(),
            flags
        ))
    } else {
        None
    }
}

/// Attach the current trace context to an outgoing request.
pub fn inject_trace_context(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match current_traceparent() {
        Some(traceparent) => builder.header("traceparent", traceparent),
        None => builder,
    }
}

/// Parse a W3C traceparent header and return an OpenTelemetry Context.
///
/// Format: `{version}-{trace_id}-{span_id}-{trace_flags}`
/// Example: `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// Returns None if the traceparent is invalid or missing.
pub fn parse_traceparent(traceparent: Option<&str>) -> Option<opentelemetry::Context> {
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };

    let tp = traceparent?;
    let parts: Vec<&str> = tp.split('-').collect();

    if parts.len() != 4 {
        tracing::warn!("Invalid traceparent format: {}", tp);
        return None;
    }

    if parts[0] != "00" {
        tracing::warn!("Unsupported traceparent version: {}", parts[0]);
        return None;
    }

    let trace_id = match hex_to_bytes::<16>(parts[1]) {
        Some(bytes) => TraceId::from_bytes(bytes),
        None => {
            tracing::warn!("Invalid trace_id in traceparent: {}", parts[1]);
            return None;
        }
    };

    let span_id = match hex_to_bytes::<8>(parts[2]) {
        Some(bytes) => SpanId::from_bytes(bytes),
        None => {
            tracing::warn!("Invalid span_id in traceparent: {}", parts[2]);
            return None;
        }
    };

    let flags = u8::from_str_radix(parts[3], 16).unwrap_or(0);

    let span_context = SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::new(flags),
        true,
        TraceState::default(),
    );

    Some(opentelemetry::Context::current().with_remote_span_context(span_context))
}

/// Create a tracing span with the given traceparent as the parent context.
#[macro_export]
macro_rules! span_with_parent {
    ($traceparent:expr, $name:expr) => {{
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let span = tracing::info_span!($name);
        if let Some(parent_ctx) = $crate::telemetry::parse_traceparent($traceparent) {
            span.set_parent(parent_ctx);
        }
        span
    }};
    ($traceparent:expr, $name:expr, $($field:tt)*) => {{
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let span = tracing::info_span!($name, $($field)*);
        if let Some(parent_ctx) = $crate::telemetry::parse_traceparent($traceparent) {
            span.set_parent(parent_ctx);
        }
        span
    }};
}

fn hex_to_bytes<const N: usize>(hex: &str) -> Option<[u8; N]> {
    if hex.len() != N * 2 {
        return None;
    }

    let mut bytes = [0u8; N];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(bytes)
}
