//! Error types for textclf

/// Result type alias using textclf's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for textclf operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model artifact could not be fetched or deserialized
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Client input rejected before inference
    #[error("validation error: {0}")]
    Validation(String),

    /// A single inference call failed (including timeouts)
    #[error("inference error: {0}")]
    Inference(String),

    /// Classification requested before the model finished loading
    #[error("model is not ready")]
    NotReady,

    /// Admission queue is full
    #[error("service overloaded, retry later")]
    Overloaded,

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable identifier used in logs, metric labels and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelLoad(_) => "model_load_error",
            Self::Validation(_) => "validation_error",
            Self::Inference(_) => "inference_error",
            Self::NotReady => "not_ready",
            Self::Overloaded => "overloaded",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
