//! textclf Classifiers
//!
//! Candle-backed sequence classifiers and the service that serves exactly one
//! of them per process.
//!
//! - [`classifier`]: the `Classifier` backend trait and `ModelLoader` seam
//! - [`hub_loader`]: downloads DistilBERT/BERT checkpoints from the Hugging Face Hub
//! - [`service`]: readiness, validation, backpressure and timeouts around the model

pub mod classifier;
pub mod hub_loader;
pub mod model_config;
pub mod sequence;
pub mod service;

pub use classifier::{top_prediction, Classifier, ModelLoader};
pub use hub_loader::HubModelLoader;
pub use model_config::{
    DeviceSpec, ModelSource, ModelSpec, DEFAULT_MODEL_REPO, DEFAULT_MODEL_REVISION,
};
pub use sequence::{BertSequenceClassifier, DistilBertSequenceClassifier};
pub use service::{InferenceService, ServiceLimits};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{Classifier, ModelLoader};
    pub use crate::hub_loader::HubModelLoader;
    pub use crate::model_config::{DeviceSpec, ModelSource, ModelSpec};
    pub use crate::service::{InferenceService, ServiceLimits};
}
