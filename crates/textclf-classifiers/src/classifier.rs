//! Classifier trait and common types

use async_trait::async_trait;
use std::sync::Arc;
use textclf_core::{Error, Result};

use crate::model_config::ModelSpec;

/// A loaded sequence-classification backend.
///
/// `predict` is synchronous and compute-bound; the inference service runs it
/// on the blocking pool, never on an async worker.
pub trait Classifier: Send + Sync {
    /// Probability per label, in the same order as [`Classifier::labels`]
    fn predict(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed label set of the model
    fn labels(&self) -> &[String];

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Whether `predict` may run on several threads at once.
    ///
    /// Backends returning `false` are serialized by the inference service.
    fn is_reentrant(&self) -> bool {
        true
    }
}

/// Produces a [`Classifier`] from a model specification
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn Classifier>>;
}

/// Pick the top-scoring label from a probability vector.
///
/// Fails when the vector does not line up with the label set or holds a
/// score outside `[0, 1]`, so callers never see an out-of-contract result.
pub fn top_prediction(labels: &[String], probabilities: &[f32]) -> Result<(String, f32)> {
    if probabilities.len() != labels.len() {
        return Err(Error::inference(format!(
            "model returned {} scores for {} labels",
            probabilities.len(),
            labels.len()
        )));
    }

    if let Some(bad) = probabilities
        .iter()
        .find(|p| !p.is_finite() || !(0.0..=1.0).contains(*p))
    {
        return Err(Error::inference(format!("model returned invalid score {}", bad)));
    }

    let (idx, score) = probabilities
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| Error::inference("model returned no scores"))?;

    Ok((labels[idx].clone(), score))
}
