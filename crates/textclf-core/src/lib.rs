//! textclf Core
//!
//! Types shared between the inference service and the HTTP server.
//!
//! This crate provides:
//! - The error taxonomy (load, validation, inference, readiness, overload)
//! - Request validation for classification input
//! - Classification results and model identifiers

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ClassificationRequest, ClassificationResult, Health, ModelId, DEFAULT_MAX_TEXT_CHARS,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ClassificationRequest, ClassificationResult, Health, ModelId};
}
