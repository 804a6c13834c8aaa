//! pocketmind - private on-device assistant
//!
//! Runs quantized language models locally for chat and document summarization.
//! Models are fetched once from HuggingFace, remembered as installed, and served
//! from the local cache afterwards; offline mode forbids the network entirely.
//!
//! # Core Concepts
//!
//! - **Model lifecycle**: at most one model is resident; loading another tears the
//!   current one down first
//! - **Generation**: single-flight, cancellable decoding with batch and streaming output
//! - **Summarization**: documents are chunked on sentence boundaries, each chunk is
//!   summarized, and the chunk summaries are merged into one
//!
//! # Example Usage
//!
//! ```no_run
//! use pocketmind::llm::{
//!     CandleRuntime, GenerationEngine, GenerationParams, ModelCatalog, ModelLifecycleManager,
//!     PromptHistory, SamplingConfig,
//! };
//! use pocketmind::settings::MemorySettings;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let manager = ModelLifecycleManager::new(
//!     Arc::new(CandleRuntime::new(None)),
//!     Arc::new(MemorySettings::new()),
//!     ModelCatalog::builtin(),
//! );
//! let engine = GenerationEngine::new(Arc::new(manager), SamplingConfig::default());
//!
//! let reply = engine
//!     .generate(
//!         "qwen2.5-0.5b-instruct",
//!         &PromptHistory::single_user("What is a B-tree?"),
//!         "",
//!         GenerationParams::default(),
//!     )
//!     .await;
//! println!("{}", reply);
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`llm`]: model catalog, lifecycle manager, generation engine, Candle runtime
//! - [`document`]: text extraction, chunking and the summarization pipeline
//! - [`settings`]: persisted installed and offline flags
//! - [`progress`]: progress events and handlers

pub mod cli;
pub mod config;
pub mod document;
pub mod llm;
pub mod progress;
pub mod settings;
pub mod util;

pub use config::{AssistantConfig, ConfigError};
pub use document::{
    DocumentError, DocumentSummary, ProcessingState, SummarizationConfig, SummarizationPipeline,
    SummaryOutcome,
};
pub use llm::{
    GenerationEngine, GenerationParams, InferenceError, ModelCatalog, ModelLifecycleManager,
    PromptHistory, SamplingConfig,
};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_pocketmind() {
        assert_eq!(NAME, "pocketmind");
    }
}
