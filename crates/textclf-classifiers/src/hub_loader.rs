//! Model loading from the Hugging Face Hub or a local directory

use async_trait::async_trait;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use textclf_core::{Error, Result};
use tokenizers::{Tokenizer, TruncationParams};

use crate::classifier::{Classifier, ModelLoader};
use crate::model_config::{DeviceSpec, ModelSource, ModelSpec};
use crate::sequence::{BertSequenceClassifier, DistilBertSequenceClassifier};

const WEIGHT_FILES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];
const TOKENIZER_FILES: [&str; 2] = ["tokenizer.json", "vocab.txt"];

/// Loads DistilBERT/BERT sequence classifiers with Candle
#[derive(Debug, Clone, Default)]
pub struct HubModelLoader {
    cache_dir: Option<PathBuf>,
}

impl HubModelLoader {
    /// Loader using the standard Hugging Face cache (`HF_HOME`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader downloading into a specific cache directory
    pub fn with_cache_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(path.into()),
        }
    }
}

#[async_trait]
impl ModelLoader for HubModelLoader {
    async fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn Classifier>> {
        let spec = spec.clone();
        let cache_dir = self.cache_dir.clone();

        // Downloads and weight deserialization block; keep them off the async workers
        tokio::task::spawn_blocking(move || load_blocking(cache_dir.as_deref(), &spec))
            .await
            .map_err(|e| Error::model_load(format!("Model loader task failed: {}", e)))?
    }
}

/// Files making up one model snapshot
#[derive(Debug)]
struct ModelFiles {
    config: PathBuf,
    weights: PathBuf,
    tokenizer: PathBuf,
}

fn load_blocking(cache_dir: Option<&Path>, spec: &ModelSpec) -> Result<Arc<dyn Classifier>> {
    let name = spec.id().to_string();
    tracing::info!(model = %name, device = %spec.device, "Resolving model files");

    let files = resolve_files(cache_dir, &spec.source)?;
    tracing::debug!(?files, "Model files resolved");

    let config_str = std::fs::read_to_string(&files.config).map_err(|e| {
        Error::model_load(format!(
            "Failed to read config {}: {}",
            files.config.display(),
            e
        ))
    })?;
    let config_json: serde_json::Value = serde_json::from_str(&config_str)
        .map_err(|e| Error::model_load(format!("Failed to parse config JSON: {}", e)))?;

    let labels = resolve_labels(&config_json, &spec.labels)?;
    let device = create_device(spec.device)?;
    let tokenizer = load_tokenizer(&files.tokenizer, spec.max_length)?;
    let vb = load_var_builder(&files.weights, &device)?;

    let model_type = config_json
        .get("model_type")
        .and_then(|v| v.as_str())
        .unwrap_or("distilbert");

    let classifier: Arc<dyn Classifier> = match model_type {
        "distilbert" => Arc::new(DistilBertSequenceClassifier::load(
            name,
            tokenizer,
            vb,
            &config_json,
            labels,
        )?),
        "bert" => Arc::new(BertSequenceClassifier::load(
            name,
            tokenizer,
            vb,
            &config_json,
            labels,
        )?),
        other => {
            return Err(Error::model_load(format!(
                "Unsupported model_type '{}' (expected distilbert or bert)",
                other
            )))
        }
    };

    Ok(classifier)
}

fn resolve_files(cache_dir: Option<&Path>, source: &ModelSource) -> Result<ModelFiles> {
    match source {
        ModelSource::Local { path } => {
            if !path.is_dir() {
                return Err(Error::model_load(format!(
                    "Model directory does not exist: {}",
                    path.display()
                )));
            }

            let first_existing = |candidates: &[&str]| {
                candidates
                    .iter()
                    .map(|file| path.join(file))
                    .find(|p| p.exists())
                    .ok_or_else(|| {
                        Error::model_load(format!(
                            "None of [{}] found in {}",
                            candidates.join(", "),
                            path.display()
                        ))
                    })
            };

            Ok(ModelFiles {
                config: first_existing(&["config.json"])?,
                weights: first_existing(&WEIGHT_FILES)?,
                tokenizer: first_existing(&TOKENIZER_FILES)?,
            })
        }
        ModelSource::HuggingFace { repo, revision } => {
            let revision = revision.clone().unwrap_or_else(|| "main".to_string());
            tracing::info!("Downloading model from HuggingFace: {} @ {}", repo, revision);

            let api = match cache_dir {
                Some(dir) => ApiBuilder::new().with_cache_dir(dir.to_path_buf()).build(),
                None => Api::new(),
            }
            .map_err(|e| {
                Error::model_load(format!("Failed to initialize HuggingFace API: {}", e))
            })?;

            let repo_obj = api.repo(Repo::with_revision(repo.clone(), RepoType::Model, revision));

            let first_available = |candidates: &[&str]| {
                let mut errors = Vec::new();
                for file in candidates {
                    match repo_obj.get(file) {
                        Ok(path) => {
                            tracing::debug!("Found {}", file);
                            return Ok(path);
                        }
                        Err(e) => errors.push(format!("{}: {}", file, e)),
                    }
                }
                Err(Error::model_load(format!(
                    "Failed to download from {}: {}",
                    repo,
                    errors.join(" | ")
                )))
            };

            Ok(ModelFiles {
                config: first_available(&["config.json"])?,
                weights: first_available(&WEIGHT_FILES)?,
                tokenizer: first_available(&TOKENIZER_FILES)?,
            })
        }
    }
}

/// Label order from configured labels, else from the model's `id2label`
fn resolve_labels(config_json: &serde_json::Value, configured: &[String]) -> Result<Vec<String>> {
    if !configured.is_empty() {
        return Ok(configured.to_vec());
    }

    let id2label = config_json
        .get("id2label")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::model_load("Model config has no id2label and no labels configured"))?;

    let mut indexed = id2label
        .iter()
        .map(|(idx, label)| {
            let idx = idx
                .parse::<usize>()
                .map_err(|_| Error::model_load(format!("Invalid id2label key '{}'", idx)))?;
            let label = label
                .as_str()
                .ok_or_else(|| Error::model_load(format!("id2label[{}] is not a string", idx)))?;
            Ok((idx, label.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    indexed.sort_by_key(|(idx, _)| *idx);

    if indexed.iter().enumerate().any(|(pos, (idx, _))| pos != *idx) {
        return Err(Error::model_load("id2label keys are not contiguous from 0"));
    }
    if indexed.iter().any(|(_, label)| label.is_empty()) {
        return Err(Error::model_load("id2label contains an empty label"));
    }

    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

fn create_device(device: DeviceSpec) -> Result<Device> {
    match device {
        DeviceSpec::Cpu => Ok(Device::Cpu),
        DeviceSpec::Cuda(idx) => Device::new_cuda(idx)
            .map_err(|e| Error::model_load(format!("Failed to create CUDA device: {}", e))),
        DeviceSpec::Metal(idx) => Device::new_metal(idx)
            .map_err(|e| Error::model_load(format!("Failed to create Metal device: {}", e))),
    }
}

fn load_var_builder(weights_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let is_safetensors = weights_path
        .extension()
        .is_some_and(|ext| ext == "safetensors");

    if is_safetensors {
        unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)
                .map_err(|e| Error::model_load(format!("Failed to load SafeTensors: {}", e)))
        }
    } else {
        VarBuilder::from_pth(weights_path, DType::F32, device)
            .map_err(|e| Error::model_load(format!("Failed to load PyTorch weights: {}", e)))
    }
}

fn load_tokenizer(path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = if path.file_name().is_some_and(|name| name == "vocab.txt") {
        tracing::debug!("Building tokenizer from vocab.txt");
        wordpiece_tokenizer(path)?
    } else {
        tracing::debug!("Loading tokenizer from tokenizer.json");
        Tokenizer::from_file(path)
            .map_err(|e| Error::model_load(format!("Failed to load tokenizer.json: {}", e)))?
    };

    // Truncate inside the tokenizer so [CLS]/[SEP] survive
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::model_load(format!("Failed to configure truncation: {}", e)))?;
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

fn wordpiece_tokenizer(vocab_path: &Path) -> Result<Tokenizer> {
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;
    use tokenizers::Model;

    let wordpiece = WordPiece::from_file(vocab_path.to_string_lossy().as_ref())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| Error::model_load(format!("Failed to build WordPiece model: {}", e)))?;

    let sep = ("[SEP]".to_string(), wordpiece.token_to_id("[SEP]").unwrap_or(102));
    let cls = ("[CLS]".to_string(), wordpiece.token_to_id("[CLS]").unwrap_or(101));

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));

    Ok(tokenizer)
}
