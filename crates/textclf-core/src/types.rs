//! Core types for textclf

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Default upper bound on request text, in Unicode code points
pub const DEFAULT_MAX_TEXT_CHARS: usize = 2000;

/// Name and optional revision pin of a pretrained model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelId {
    /// Repository name or local path
    pub name: String,

    /// Revision pin (commit, tag or branch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl ModelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(revision) => write!(f, "{}@{}", self.name, revision),
            None => f.write_str(&self.name),
        }
    }
}

/// Validated classification input.
///
/// The only way to build one is [`ClassificationRequest::new`], so holding a
/// request means its text is non-empty and within the configured limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    text: String,
}

impl ClassificationRequest {
    /// Validate `text` against a limit counted in code points
    pub fn new(text: impl Into<String>, max_chars: usize) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::validation("text must not be empty"));
        }

        // Count lazily so huge payloads stop at the first char past the limit
        if text.chars().nth(max_chars).is_some() {
            return Err(Error::validation(format!(
                "text exceeds {} characters",
                max_chars
            )));
        }

        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Result of classification
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Classification label, drawn from the model's label set
    pub label: String,

    /// Confidence score (0.0-1.0)
    pub score: f32,

    /// Model that produced the result
    pub model: String,

    /// Latency in microseconds
    pub latency_us: u64,
}

/// Readiness snapshot of the inference service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub ready: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Health {
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            model: None,
            loaded_at: None,
        }
    }

    pub fn ready(model: &ModelId, loaded_at: DateTime<Utc>) -> Self {
        Self {
            ready: true,
            model: Some(model.to_string()),
            loaded_at: Some(loaded_at),
        }
    }
}
