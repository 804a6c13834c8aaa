use crate::llm::InferenceError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of document ingestion and summarization
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract text from {path}: {message}")]
    ExtractionFailed { path: PathBuf, message: String },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}
