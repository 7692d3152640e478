//! Logging and metrics setup for the binary

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

/// Initialize tracing/logging
pub fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("textclf=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("textclf=info,tower_http=warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Install the Prometheus recorder and return the handle used by `/metrics`
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "textclf_requests_total",
        "Prediction requests by outcome"
    );
    metrics::describe_histogram!(
        "textclf_inference_latency_us",
        metrics::Unit::Microseconds,
        "Forward pass latency in microseconds"
    );
    metrics::describe_gauge!("textclf_model_ready", "1 once the model has loaded");
    metrics::describe_gauge!(
        "textclf_model_load_seconds",
        metrics::Unit::Seconds,
        "Time taken to load the model"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
