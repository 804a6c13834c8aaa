//! Candle-backed inference runtime

use super::download::ModelStore;
use super::hardware::{HardwareCapabilities, HardwareDetector};
use super::model::CandleModel;
use crate::llm::catalog::ModelDescriptor;
use crate::llm::error::InferenceError;
use crate::llm::runtime::{InferenceRuntime, ModelHandle, ProgressCallback};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Runs GGUF models from the HuggingFace cache on the best local device
pub struct CandleRuntime {
    store: ModelStore,
    capabilities: HardwareCapabilities,
}

impl CandleRuntime {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self::with_capabilities(cache_dir, HardwareDetector::detect())
    }

    pub fn with_capabilities(
        cache_dir: Option<PathBuf>,
        capabilities: HardwareCapabilities,
    ) -> Self {
        Self {
            store: ModelStore::new(cache_dir),
            capabilities,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn capabilities(&self) -> &HardwareCapabilities {
        &self.capabilities
    }
}

fn asset_error(model: &ModelDescriptor, error: anyhow::Error) -> InferenceError {
    InferenceError::ModelAssetMissing {
        model: model.id.clone(),
        message: format!("{:#}", error),
    }
}

async fn blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T, InferenceError> + Send + 'static,
) -> Result<T, InferenceError> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| InferenceError::Runtime(format!("model loading task failed: {}", e)))?
}

#[async_trait]
impl InferenceRuntime for CandleRuntime {
    async fn acquire_local(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<ModelHandle, InferenceError> {
        let store = self.store.clone();
        let device = self.capabilities.best_device();
        let descriptor = descriptor.clone();

        blocking(move || {
            let files = store.cached(&descriptor).ok_or_else(|| {
                InferenceError::ModelAssetMissing {
                    model: descriptor.id.clone(),
                    message: format!("not found in {}", store.cache_dir().display()),
                }
            })?;
            debug!(model = %descriptor.id, weights = %files.weights.display(), "Using cached files");

            let model = CandleModel::load(descriptor.clone(), &files, device)
                .map_err(|e| asset_error(&descriptor, e))?;
            Ok(Arc::new(model) as ModelHandle)
        })
        .await
    }

    async fn acquire_with_download(
        &self,
        descriptor: &ModelDescriptor,
        on_progress: ProgressCallback,
    ) -> Result<ModelHandle, InferenceError> {
        let store = self.store.clone();
        let device = self.capabilities.best_device();
        let descriptor = descriptor.clone();

        blocking(move || {
            let files = store
                .download(&descriptor, on_progress)
                .map_err(|e| InferenceError::classify(&e))?;

            let model = CandleModel::load(descriptor.clone(), &files, device)
                .map_err(|e| asset_error(&descriptor, e))?;
            Ok(Arc::new(model) as ModelHandle)
        })
        .await
    }

    fn name(&self) -> &str {
        "candle"
    }
}
