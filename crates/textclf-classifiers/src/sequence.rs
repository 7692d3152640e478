//! Candle sequence-classification heads for BERT-family encoders

use candle_core::{Device, IndexOp, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use textclf_core::{Error, Result};
use tokenizers::{Encoding, Tokenizer};

use crate::classifier::Classifier;

fn load_err(context: &'static str) -> impl Fn(candle_core::Error) -> Error {
    move |e| Error::model_load(format!("{}: {}", context, e))
}

fn infer_err(context: &'static str) -> impl Fn(candle_core::Error) -> Error {
    move |e| Error::inference(format!("{}: {}", context, e))
}

fn encode(tokenizer: &Tokenizer, text: &str) -> Result<Encoding> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| Error::inference(format!("Tokenization failed: {}", e)))?;

    if encoding.get_ids().is_empty() {
        return Err(Error::inference("Tokenizer produced no tokens"));
    }
    Ok(encoding)
}

fn row_tensor<T: candle_core::WithDType>(values: &[T], device: &Device) -> Result<Tensor> {
    Tensor::new(values, device)
        .map_err(infer_err("Failed to create input tensor"))?
        .unsqueeze(0)
        .map_err(infer_err("Failed to unsqueeze"))
}

fn cls_embedding(hidden_states: &Tensor) -> Result<Tensor> {
    hidden_states
        .i((0, 0, ..))
        .map_err(infer_err("Failed to get CLS token"))?
        .unsqueeze(0)
        .map_err(infer_err("Failed to unsqueeze CLS"))
}

fn to_probabilities(logits: &Tensor) -> Result<Vec<f32>> {
    candle_nn::ops::softmax(logits, D::Minus1)
        .map_err(infer_err("Softmax failed"))?
        .squeeze(0)
        .map_err(infer_err("Squeeze failed"))?
        .to_vec1()
        .map_err(infer_err("Failed to convert to vec"))
}

/// DistilBERT with the `pre_classifier -> ReLU -> classifier` head
pub struct DistilBertSequenceClassifier {
    name: String,
    tokenizer: Tokenizer,
    model: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
    device: Device,
    labels: Vec<String>,
}

impl DistilBertSequenceClassifier {
    pub fn load(
        name: String,
        tokenizer: Tokenizer,
        vb: VarBuilder,
        config_json: &serde_json::Value,
        labels: Vec<String>,
    ) -> Result<Self> {
        let config: DistilBertConfig = serde_json::from_value(config_json.clone())
            .map_err(|e| Error::model_load(format!("Failed to parse DistilBERT config: {}", e)))?;

        let hidden_size = config_json
            .get("dim")
            .or_else(|| config_json.get("hidden_size"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::model_load("DistilBERT config has no 'dim'"))?
            as usize;

        let device = vb.device().clone();
        let model = DistilBertModel::load(vb.pp("distilbert"), &config)
            .map_err(load_err("Failed to load DistilBERT model"))?;
        let pre_classifier = candle_nn::linear(hidden_size, hidden_size, vb.pp("pre_classifier"))
            .map_err(load_err("Failed to load pre_classifier"))?;
        let classifier = candle_nn::linear(hidden_size, labels.len(), vb.pp("classifier"))
            .map_err(load_err("Failed to load classification head"))?;

        tracing::info!(
            hidden_size,
            labels = ?labels,
            "Loaded DistilBERT sequence classifier"
        );

        Ok(Self {
            name,
            tokenizer,
            model,
            pre_classifier,
            classifier,
            device,
            labels,
        })
    }
}

impl Classifier for DistilBertSequenceClassifier {
    fn predict(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = encode(&self.tokenizer, text)?;

        let input_ids = row_tensor(encoding.get_ids(), &self.device)?;

        // DistilBERT masks positions where the mask is 1, the inverse of the tokenizer's mask
        let inverted_mask: Vec<u8> = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| u8::from(x == 0))
            .collect();
        let attention_mask = row_tensor(&inverted_mask, &self.device)?;

        let hidden_states = self
            .model
            .forward(&input_ids, &attention_mask)
            .map_err(infer_err("Model forward pass failed"))?;

        let pooled = self
            .pre_classifier
            .forward(&cls_embedding(&hidden_states)?)
            .map_err(infer_err("Pre-classifier failed"))?
            .relu()
            .map_err(infer_err("ReLU failed"))?;

        let logits = self
            .classifier
            .forward(&pooled)
            .map_err(infer_err("Classification head failed"))?;

        to_probabilities(&logits)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// BERT with the `pooler (tanh) -> classifier` head
pub struct BertSequenceClassifier {
    name: String,
    tokenizer: Tokenizer,
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    device: Device,
    labels: Vec<String>,
}

impl BertSequenceClassifier {
    pub fn load(
        name: String,
        tokenizer: Tokenizer,
        vb: VarBuilder,
        config_json: &serde_json::Value,
        labels: Vec<String>,
    ) -> Result<Self> {
        let config: BertConfig = serde_json::from_value(config_json.clone())
            .map_err(|e| Error::model_load(format!("Failed to parse BERT config: {}", e)))?;

        // Fine-tuned checkpoints nest the encoder under "bert"; bare exports do not
        let mut errors = Vec::new();
        let mut loaded = None;
        for prefix in ["bert", ""] {
            let vb_prefix = if prefix.is_empty() {
                vb.clone()
            } else {
                vb.pp(prefix)
            };
            match BertModel::load(vb_prefix.clone(), &config) {
                Ok(model) => {
                    loaded = Some((model, vb_prefix));
                    break;
                }
                Err(e) => errors.push(format!(
                    "{}: {}",
                    if prefix.is_empty() { "<root>" } else { prefix },
                    e
                )),
            }
        }

        let (model, encoder_vb) = loaded.ok_or_else(|| {
            Error::model_load(format!(
                "Failed to load BERT backbone with tried prefixes [{}]",
                errors.join(" | ")
            ))
        })?;

        let pooler = candle_nn::linear(
            config.hidden_size,
            config.hidden_size,
            encoder_vb.pp("pooler").pp("dense"),
        )
        .map_err(load_err("Failed to load pooler"))?;
        let classifier = candle_nn::linear(config.hidden_size, labels.len(), vb.pp("classifier"))
            .map_err(load_err("Failed to load classification head"))?;

        tracing::info!(
            hidden_size = config.hidden_size,
            labels = ?labels,
            "Loaded BERT sequence classifier"
        );

        Ok(Self {
            name,
            tokenizer,
            model,
            pooler,
            classifier,
            device: vb.device().clone(),
            labels,
        })
    }
}

impl Classifier for BertSequenceClassifier {
    fn predict(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = encode(&self.tokenizer, text)?;

        let input_ids = row_tensor(encoding.get_ids(), &self.device)?;
        let token_type_ids = row_tensor(encoding.get_type_ids(), &self.device)?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, None)
            .map_err(infer_err("Model forward pass failed"))?;

        let pooled = self
            .pooler
            .forward(&cls_embedding(&hidden_states)?)
            .map_err(infer_err("Pooler failed"))?
            .tanh()
            .map_err(infer_err("Tanh failed"))?;

        let logits = self
            .classifier
            .forward(&pooled)
            .map_err(infer_err("Classification head failed"))?;

        to_probabilities(&logits)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn name(&self) -> &str {
        &self.name
    }
}
