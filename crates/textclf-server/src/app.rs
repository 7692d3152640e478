use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use textclf_classifiers::{InferenceService, ModelLoader};
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{CorsConfig, ServerConfig};
use crate::routes;
use crate::state::AppState;
use crate::static_files;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the Axum application
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/", get(routes::root))
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/predict", post(routes::predict))
        .route("/metrics", get(routes::metrics))
        // Embedded frontend
        .route("/ui", get(static_files::redirect_to_ui))
        .route("/ui/", get(static_files::serve_static))
        .route("/ui/*path", get(static_files::serve_static))
        .fallback(routes::fallback)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allows_any() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Create the inference service and load the configured model.
///
/// With `startup.load_in_background` the load runs on a spawned task and
/// this returns immediately; a failed load leaves the service not ready.
/// Otherwise a failed load is returned to the caller.
pub async fn start_service(
    config: &ServerConfig,
    loader: Arc<dyn ModelLoader>,
) -> textclf_core::Result<Arc<InferenceService>> {
    let spec = config.model_spec();
    let service = Arc::new(InferenceService::new(loader, config.service_limits()));

    if config.startup.load_in_background {
        info!(model = %spec.id(), "Loading model in the background");
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            // Failures are logged by the service; readiness stays false
            let _ = service.initialize(&spec).await;
        });
    } else {
        service.initialize(&spec).await?;
    }

    Ok(service)
}

/// Load the model, then serve until SIGINT/SIGTERM
pub async fn run_server(config: ServerConfig, metrics: PrometheusHandle) -> anyhow::Result<()> {
    let bind_address = config.bind_address();
    let loader: Arc<dyn ModelLoader> = Arc::new(config.model_loader());
    let service = start_service(&config, loader).await?;

    let app = build_router(AppState::new(service, config, metrics));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
