//! Model files on disk and on the HuggingFace Hub

use crate::llm::catalog::ModelDescriptor;
use crate::llm::runtime::ProgressCallback;
use anyhow::{Context, Result};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::api::Progress;
use hf_hub::Cache;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Resolved paths of a model's weights and tokenizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub weights: PathBuf,
    pub tokenizer: PathBuf,
}

/// HuggingFace-layout cache of model files
#[derive(Debug, Clone)]
pub struct ModelStore {
    cache_dir: PathBuf,
}

impl ModelStore {
    /// Uses `cache_dir`, or the standard HuggingFace cache location
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|d| d.join("huggingface").join("hub"))
                .unwrap_or_else(|| PathBuf::from(".cache/huggingface/hub"))
        });
        debug!("Model cache directory: {}", cache_dir.display());
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Files already present in the cache; never touches the network
    pub fn cached(&self, model: &ModelDescriptor) -> Option<ModelFiles> {
        let cache = Cache::new(self.cache_dir.clone());
        let weights = cache.model(model.repo_id.clone()).get(&model.filename)?;
        let tokenizer = cache
            .model(model.tokenizer_repo.clone())
            .get(TOKENIZER_FILE)?;

        (weights.exists() && tokenizer.exists()).then_some(ModelFiles { weights, tokenizer })
    }

    /// Downloads whatever is missing. Blocking; run on a blocking thread.
    pub fn download(
        &self,
        model: &ModelDescriptor,
        on_progress: ProgressCallback,
    ) -> Result<ModelFiles> {
        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!(
                "Failed to create model cache directory {}",
                self.cache_dir.display()
            )
        })?;

        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .with_progress(false)
            .build()
            .context("Failed to initialize HuggingFace Hub API")?;

        let cached_weights = Cache::new(self.cache_dir.clone())
            .model(model.repo_id.clone())
            .get(&model.filename)
            .filter(|path| path.exists());

        let weights = match cached_weights {
            Some(path) => {
                debug!("Weights already cached at {}", path.display());
                on_progress(1.0);
                path
            }
            None => {
                info!(
                    "Downloading {} (~{} MB) from {}",
                    model.display_name, model.size_mb, model.repo_id
                );
                api.model(model.repo_id.clone())
                    .download_with_progress(&model.filename, DownloadProgress::new(on_progress))
                    .with_context(|| {
                        format!("Failed to download model file {}", model.filename)
                    })?
            }
        };

        debug!("Fetching tokenizer from {}", model.tokenizer_repo);
        let tokenizer = api
            .model(model.tokenizer_repo.clone())
            .get(TOKENIZER_FILE)
            .with_context(|| {
                format!(
                    "Failed to download {} from {}",
                    TOKENIZER_FILE, model.tokenizer_repo
                )
            })?;

        info!("Model files ready at {}", weights.display());
        Ok(ModelFiles { weights, tokenizer })
    }
}

/// Adapts hf-hub byte counts to a completion fraction
struct DownloadProgress {
    callback: ProgressCallback,
    total: usize,
    received: usize,
}

impl DownloadProgress {
    fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            total: 0,
            received: 0,
        }
    }

    fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.received as f64 / self.total as f64).min(1.0)
        }
    }
}

impl Progress for DownloadProgress {
    fn init(&mut self, size: usize, filename: &str) {
        debug!(file = %filename, bytes = size, "Download started");
        self.total = size;
        self.received = 0;
        (self.callback)(0.0);
    }

    fn update(&mut self, size: usize) {
        self.received += size;
        (self.callback)(self.fraction());
    }

    fn finish(&mut self) {
        (self.callback)(1.0);
    }
}
