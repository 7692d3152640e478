use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use textclf_classifiers::InferenceService;

use crate::config::ServerConfig;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// The one model this process serves
    pub service: Arc<InferenceService>,

    /// Effective configuration after overrides
    pub config: Arc<ServerConfig>,

    /// Renders `/metrics`
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        service: Arc<InferenceService>,
        config: ServerConfig,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            service,
            config: Arc::new(config),
            metrics,
        }
    }
}
