//! Model lifecycle and text generation
//!
//! [`ModelLifecycleManager`] keeps at most one model resident and decides how it is
//! acquired. [`GenerationEngine`] runs single-flight generations on it. Both reach the
//! model only through the [`InferenceRuntime`] traits, implemented by the Candle runtime
//! and by a scripted mock.

pub mod catalog;
pub mod embedded;
mod engine;
mod error;
mod lifecycle;
pub mod mock;
mod prompt;
mod runtime;
mod types;

pub use catalog::{Capability, CatalogError, ModelCatalog, ModelDescriptor};
pub use embedded::{CandleRuntime, ComputeDevice, HardwareCapabilities, HardwareDetector};
pub use engine::{GenerationEngine, GenerationStream};
pub use error::{ErrorCategory, InferenceError};
pub use lifecycle::{LoadState, ModelLifecycleManager};
pub use mock::{MockRuntime, MockScript};
pub use prompt::{ChatMlFormatter, PromptFormatter};
pub use runtime::{DecodeSession, InferenceRuntime, LoadedModel, ModelHandle, ProgressCallback};
pub use types::{
    ChatMessage, Generation, GenerationParams, GenerationStats, HaltReason, MessageRole,
    PromptHistory, SamplingConfig,
};
