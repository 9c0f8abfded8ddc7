// Error types for model loading and generation
//
// Loading failures surface here; an empty generation is not an error.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a model or running a generation request.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("No checkpoint found in {}", .0.display())]
    NoCheckpoint(PathBuf),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Model error: {0}")]
    Model(String),

    #[cfg(feature = "gpt2")]
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias using [`GeneratorError`].
pub type Result<T> = std::result::Result<T, GeneratorError>;
