//! Model configuration structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use textclf_core::ModelId;

/// Model served when nothing else is configured
pub const DEFAULT_MODEL_REPO: &str = "distilbert/distilbert-base-uncased-finetuned-sst-2-english";

/// Revision pin for [`DEFAULT_MODEL_REPO`]
pub const DEFAULT_MODEL_REVISION: &str = "714eb0f";

/// Everything needed to load the served model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Where to load from
    #[serde(default)]
    pub source: ModelSource,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Maximum sequence length in tokens; longer inputs are truncated
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Label order overriding the model's `id2label` when non-empty
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::default(),
            device: DeviceSpec::default(),
            max_length: default_max_length(),
            labels: Vec::new(),
        }
    }
}

impl ModelSpec {
    /// Spec for a Hugging Face repository
    pub fn from_hf(repo: impl Into<String>) -> Self {
        Self {
            source: ModelSource::HuggingFace {
                repo: repo.into(),
                revision: None,
            },
            ..Default::default()
        }
    }

    /// Spec for a model directory on disk
    pub fn from_local(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ModelSource::Local { path: path.into() },
            ..Default::default()
        }
    }

    /// Set Hugging Face revision
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        if let ModelSource::HuggingFace { repo, .. } = self.source {
            self.source = ModelSource::HuggingFace {
                repo,
                revision: Some(revision.into()),
            };
        }
        self
    }

    /// Set device
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Set label names
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> ModelId {
        self.source.id()
    }
}

/// Model source configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSource {
    /// Load from a directory containing config, tokenizer and weights
    Local { path: PathBuf },

    /// Download from Hugging Face Hub
    HuggingFace {
        repo: String,
        #[serde(default)]
        revision: Option<String>,
    },
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::HuggingFace {
            repo: DEFAULT_MODEL_REPO.to_string(),
            revision: Some(DEFAULT_MODEL_REVISION.to_string()),
        }
    }
}

impl ModelSource {
    pub fn id(&self) -> ModelId {
        match self {
            Self::Local { path } => ModelId::new(path.display().to_string()),
            Self::HuggingFace { repo, revision } => ModelId {
                name: repo.clone(),
                revision: revision.clone(),
            },
        }
    }
}

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSpec {
    /// CPU inference (always available)
    #[default]
    Cpu,
    /// CUDA GPU inference
    Cuda(usize),
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl FromStr for DeviceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (kind, index) = match lower.split_once(':') {
            Some((kind, idx)) => {
                let idx = idx
                    .parse::<usize>()
                    .map_err(|_| format!("invalid device index in '{}'", s))?;
                (kind, idx)
            }
            None => (lower.as_str(), 0),
        };

        match kind {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(index)),
            "metal" | "mps" => Ok(Self::Metal(index)),
            _ => Err(format!("unknown device '{}' (expected cpu, cuda[:N] or metal[:N])", s)),
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{}", idx),
            Self::Metal(idx) => write!(f, "metal:{}", idx),
        }
    }
}

impl Serialize for DeviceSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn default_max_length() -> usize {
    512
}
