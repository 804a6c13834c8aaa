//! Inference runtime abstraction
//!
//! The lifecycle manager and the generation engine only talk to the model through these
//! traits, so the candle-backed runtime and the scripted mock are interchangeable.

use super::catalog::ModelDescriptor;
use super::error::InferenceError;
use super::types::SamplingConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a resident model
pub type ModelHandle = Arc<dyn LoadedModel>;

/// Receives download completion in the range `0.0..=1.0`
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Acquires model handles from local storage or the network
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Loads the model from the local cache only; never touches the network
    async fn acquire_local(&self, descriptor: &ModelDescriptor)
        -> Result<ModelHandle, InferenceError>;

    /// Loads the model, downloading any missing files first
    async fn acquire_with_download(
        &self,
        descriptor: &ModelDescriptor,
        on_progress: ProgressCallback,
    ) -> Result<ModelHandle, InferenceError>;

    fn name(&self) -> &str;
}

/// A model resident in memory
pub trait LoadedModel: Send + Sync {
    fn descriptor(&self) -> &ModelDescriptor;

    /// Tokenizes `prompt` and prepares a sampler.
    ///
    /// Decoding is blocking work; callers run it on a blocking thread.
    fn start_decode<'a>(
        &'a self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<Box<dyn DecodeSession + 'a>, InferenceError>;
}

/// Token-by-token decoding state for one prompt
pub trait DecodeSession {
    /// Samples the next token; `None` marks end of sequence
    fn next_token(&mut self) -> Result<Option<u32>, InferenceError>;

    /// Renders generated tokens to text
    fn detokenize(&self, tokens: &[u32]) -> Result<String, InferenceError>;
}
