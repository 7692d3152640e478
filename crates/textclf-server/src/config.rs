//! Server configuration

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use textclf_classifiers::{
    DeviceSpec, HubModelLoader, ModelSpec, ServiceLimits, DEFAULT_MODEL_REPO,
    DEFAULT_MODEL_REVISION,
};
use textclf_core::{Error, Result, DEFAULT_MAX_TEXT_CHARS};

use crate::cli::{ModelArgs, ServeArgs};

/// Upper bound on `limits.max_concurrency`
pub const MAX_CONCURRENCY_LIMIT: usize = 1024;

/// Upper bound on `limits.max_queue`
pub const MAX_QUEUE_LIMIT: usize = 100_000;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Model to serve
    #[serde(default)]
    pub model: ModelConfig,

    /// Request limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Startup behavior
    #[serde(default)]
    pub startup: StartupConfig,

    /// Cross-origin policy
    #[serde(default)]
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Load configuration from file, or use defaults when the file is absent
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            Error::config(format!("invalid config file {}: {}", config_path.display(), e))
        })
    }

    /// Apply `serve` command-line overrides
    pub fn with_serve_args(mut self, args: &ServeArgs) -> Self {
        if let Some(listen) = &args.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if args.background_load {
            self.startup.load_in_background = true;
        }
        self.with_model_args(&args.model)
    }

    /// Apply model selection overrides
    pub fn with_model_args(mut self, args: &ModelArgs) -> Self {
        if let Some(repo) = &args.model {
            // An explicit repository always beats a configured local directory
            self.model.path = None;
            if *repo != self.model.repo {
                // The configured pin belongs to the configured repository
                self.model.revision = None;
            }
            self.model.repo = repo.clone();
        }
        if let Some(revision) = &args.revision {
            self.model.revision = Some(revision.clone());
        }
        if let Some(device) = args.device {
            self.model.device = device;
        }
        self
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.model.path.is_none() && self.model.repo.trim().is_empty() {
            return Err(Error::config("model.repo must not be empty"));
        }
        if self.model.max_length == 0 {
            return Err(Error::config("model.max_length must be greater than 0"));
        }
        if self.limits.max_text_chars == 0 {
            return Err(Error::config("limits.max_text_chars must be greater than 0"));
        }
        if self.limits.max_concurrency == 0 {
            return Err(Error::config("limits.max_concurrency must be greater than 0"));
        }
        if self.limits.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(Error::config(format!(
                "limits.max_concurrency must be at most {}",
                MAX_CONCURRENCY_LIMIT
            )));
        }
        if self.limits.max_queue > MAX_QUEUE_LIMIT {
            return Err(Error::config(format!(
                "limits.max_queue must be at most {}",
                MAX_QUEUE_LIMIT
            )));
        }
        if self.limits.inference_timeout_ms == 0 {
            return Err(Error::config(
                "limits.inference_timeout_ms must be greater than 0",
            ));
        }
        if self.cors.allow_origins.is_empty() {
            return Err(Error::config("cors.allow_origins must not be empty"));
        }
        for origin in &self.cors.allow_origins {
            if origin != "*" && HeaderValue::from_str(origin).is_err() {
                return Err(Error::config(format!("invalid CORS origin '{}'", origin)));
            }
        }
        Ok(())
    }

    pub fn model_spec(&self) -> ModelSpec {
        let spec = match &self.model.path {
            Some(path) => ModelSpec::from_local(path),
            None => {
                let spec = ModelSpec::from_hf(&self.model.repo);
                match &self.model.revision {
                    Some(revision) => spec.with_revision(revision),
                    None => spec,
                }
            }
        };

        ModelSpec {
            max_length: self.model.max_length,
            ..spec
                .with_device(self.model.device)
                .with_labels(self.model.labels.iter().cloned())
        }
    }

    /// Loader for the configured model, honoring `model.cache_dir`
    pub fn model_loader(&self) -> HubModelLoader {
        match &self.model.cache_dir {
            Some(dir) => HubModelLoader::with_cache_dir(dir),
            None => HubModelLoader::new(),
        }
    }

    pub fn service_limits(&self) -> ServiceLimits {
        ServiceLimits {
            max_text_chars: self.limits.max_text_chars,
            max_concurrency: self.limits.max_concurrency,
            max_queue: self.limits.max_queue,
            inference_timeout: Duration::from_millis(self.limits.inference_timeout_ms),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            model: ModelConfig::default(),
            limits: LimitsConfig::default(),
            startup: StartupConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hugging Face repository
    #[serde(default = "default_repo")]
    pub repo: String,

    /// Revision pin for `repo`
    #[serde(default)]
    pub revision: Option<String>,

    /// Local model directory; takes precedence over `repo`
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Hub download cache; the Hugging Face default when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Inference device
    #[serde(default)]
    pub device: DeviceSpec,

    /// Token limit; longer inputs are truncated
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Label names overriding the model's own, in logit order
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo: default_repo(),
            revision: Some(DEFAULT_MODEL_REVISION.to_string()),
            path: None,
            cache_dir: None,
            device: DeviceSpec::default(),
            max_length: default_max_length(),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Requests allowed to wait for an inference slot before 503
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
            max_concurrency: default_max_concurrency(),
            max_queue: default_max_queue(),
            inference_timeout_ms: default_inference_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Bind before the model is loaded instead of failing startup on load errors
    #[serde(default)]
    pub load_in_background: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any origin
    #[serde(default = "default_allow_origins")]
    pub allow_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_allow_origins(),
        }
    }
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allow_origins.iter().any(|origin| origin == "*")
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_repo() -> String {
    DEFAULT_MODEL_REPO.to_string()
}

fn default_max_length() -> usize {
    512
}

fn default_max_text_chars() -> usize {
    DEFAULT_MAX_TEXT_CHARS
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_queue() -> usize {
    64
}

fn default_inference_timeout_ms() -> u64 {
    10_000
}

fn default_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}
