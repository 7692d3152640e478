//! Single-model inference service
//!
//! [`InferenceService`] owns the lifecycle of one loaded classifier:
//!
//! - `initialize` loads the model exactly once; readiness flips from false to
//!   true on success and never back.
//! - `classify` validates input before touching the model, applies
//!   admission control, and runs the forward pass on the blocking pool. One
//!   deadline covers both the wait for an inference slot and the pass itself.
//! - `health` is a pure read of readiness.
//!
//! Concurrency: the loaded handle is shared read-only. Backends that report
//! [`Classifier::is_reentrant`] run up to `max_concurrency` passes at once;
//! all others are serialized behind a single permit. At most `max_queue`
//! further requests may wait for a permit; the rest are rejected.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use textclf_core::{
    ClassificationRequest, ClassificationResult, Error, Health, ModelId, Result,
    DEFAULT_MAX_TEXT_CHARS,
};
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::timeout_at;
use tracing::{debug, error, info, warn};

use crate::classifier::{top_prediction, Classifier, ModelLoader};
use crate::model_config::ModelSpec;

/// Request limits enforced by the service
#[derive(Debug, Clone)]
pub struct ServiceLimits {
    /// Maximum input length in Unicode code points
    pub max_text_chars: usize,

    /// Forward passes allowed to run at the same time
    pub max_concurrency: usize,

    /// Requests allowed to wait for a free inference slot
    pub max_queue: usize,

    /// Upper bound on one request, from slot wait to finished pass
    pub inference_timeout: Duration,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_concurrency: 4,
            max_queue: 64,
            inference_timeout: Duration::from_secs(10),
        }
    }
}

/// A successfully loaded model; immutable once built
struct ModelHandle {
    id: ModelId,
    loaded_at: DateTime<Utc>,
    labels: Vec<String>,
    classifier: Arc<dyn Classifier>,
    permits: Arc<Semaphore>,
    admission: Arc<Semaphore>,
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        info!(model = %self.id, "Releasing model");
    }
}

/// Serves classification requests against one model
pub struct InferenceService {
    loader: Arc<dyn ModelLoader>,
    limits: ServiceLimits,
    handle: OnceCell<ModelHandle>,
}

impl InferenceService {
    /// Create an unready service; call [`InferenceService::initialize`] next
    pub fn new(loader: Arc<dyn ModelLoader>, limits: ServiceLimits) -> Self {
        metrics::gauge!("textclf_model_ready").set(0.0);

        Self {
            loader,
            limits,
            handle: OnceCell::new(),
        }
    }

    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    /// Load the model. Succeeds at most once; failed attempts may be retried.
    pub async fn initialize(&self, spec: &ModelSpec) -> Result<()> {
        if let Some(handle) = self.handle.get() {
            info!(model = %handle.id, "Model already loaded, skipping initialize");
            return Ok(());
        }

        match self.handle.get_or_try_init(|| self.load_handle(spec)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(model = %spec.id(), error = %e, "Model failed to load");
                Err(e)
            }
        }
    }

    async fn load_handle(&self, spec: &ModelSpec) -> Result<ModelHandle> {
        let id = spec.id();
        let start = Instant::now();
        info!(model = %id, "Loading model");

        let classifier = self.loader.load(spec).await.map_err(|e| match e {
            Error::ModelLoad(_) => e,
            other => Error::model_load(other.to_string()),
        })?;

        let labels = classifier.labels().to_vec();
        if labels.is_empty() || labels.iter().any(String::is_empty) {
            return Err(Error::model_load(format!(
                "Model {} exposes an empty label set or label",
                id
            )));
        }

        let permits = if classifier.is_reentrant() {
            self.limits.max_concurrency.min(Semaphore::MAX_PERMITS)
        } else {
            warn!(model = %id, "Backend is not reentrant, serializing inference");
            1
        };

        // Running plus waiting requests; sized from the real permit count
        let admitted = permits
            .saturating_add(self.limits.max_queue)
            .min(Semaphore::MAX_PERMITS);

        let elapsed = start.elapsed();
        metrics::gauge!("textclf_model_load_seconds").set(elapsed.as_secs_f64());
        metrics::gauge!("textclf_model_ready").set(1.0);
        info!(
            model = %id,
            labels = ?labels,
            concurrency = permits,
            admitted,
            elapsed_ms = elapsed.as_millis() as u64,
            "Model ready"
        );

        Ok(ModelHandle {
            id,
            loaded_at: Utc::now(),
            labels,
            classifier,
            permits: Arc::new(Semaphore::new(permits)),
            admission: Arc::new(Semaphore::new(admitted)),
        })
    }

    /// Validate raw text against this service's limits
    pub fn request(&self, text: impl Into<String>) -> Result<ClassificationRequest> {
        ClassificationRequest::new(text, self.limits.max_text_chars)
    }

    /// Validate and classify in one step
    pub async fn classify_text(&self, text: impl Into<String>) -> Result<ClassificationResult> {
        let request = self.request(text)?;
        self.classify(request).await
    }

    /// Classify one validated request
    pub async fn classify(&self, request: ClassificationRequest) -> Result<ClassificationResult> {
        // Requests may have been built against a looser limit
        if request.text().chars().nth(self.limits.max_text_chars).is_some() {
            return Err(Error::validation(format!(
                "text exceeds {} characters",
                self.limits.max_text_chars
            )));
        }

        let handle = self.handle.get().ok_or(Error::NotReady)?;

        let _admitted = Arc::clone(&handle.admission)
            .try_acquire_owned()
            .map_err(|_| Error::Overloaded)?;

        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.limits.inference_timeout;

        let permit = match timeout_at(deadline, Arc::clone(&handle.permits).acquire_owned()).await {
            Err(_) => {
                warn!("No inference slot freed up before the deadline");
                return Err(Error::inference(format!(
                    "inference timed out after {}ms waiting for a free slot",
                    self.limits.inference_timeout.as_millis()
                )));
            }
            Ok(permit) => permit.map_err(|_| Error::inference("Inference pool closed"))?,
        };

        let classifier = Arc::clone(&handle.classifier);
        let text = request.into_text();

        // The permit moves into the task so a timed-out pass keeps its slot until it really ends
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            classifier.predict(&text)
        });

        let probabilities = match timeout_at(deadline, task).await {
            Err(_) => {
                return Err(Error::inference(format!(
                    "inference timed out after {}ms",
                    self.limits.inference_timeout.as_millis()
                )))
            }
            Ok(Err(join_error)) if join_error.is_panic() => {
                return Err(Error::inference("inference panicked"))
            }
            Ok(Err(join_error)) => {
                return Err(Error::inference(format!("inference task failed: {}", join_error)))
            }
            Ok(Ok(result)) => result.map_err(|e| match e {
                Error::Inference(_) => e,
                other => Error::inference(other.to_string()),
            })?,
        };

        let (label, score) = top_prediction(&handle.labels, &probabilities)?;
        let latency_us = start.elapsed().as_micros() as u64;
        metrics::histogram!("textclf_inference_latency_us").record(latency_us as f64);
        debug!(label = %label, score, latency_us, "Classified");

        Ok(ClassificationResult {
            label,
            score,
            model: handle.classifier.name().to_string(),
            latency_us,
        })
    }

    /// Readiness snapshot; never fails
    pub fn health(&self) -> Health {
        match self.handle.get() {
            Some(handle) => Health::ready(&handle.id, handle.loaded_at),
            None => Health::not_ready(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.handle.initialized()
    }

    /// Label set of the loaded model
    pub fn labels(&self) -> Option<&[String]> {
        self.handle.get().map(|handle| handle.labels.as_slice())
    }
}
