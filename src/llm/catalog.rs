//! Model catalog
//!
//! Descriptors for the models the assistant knows how to acquire. The built-in catalog
//! ships a few quantized Qwen2.5 instruct models; a JSON file can replace it.

use super::embedded::HardwareCapabilities;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// What a model is suitable for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Summarization,
    Multilingual,
}

/// Static description of one model asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Stable key used by callers and in persisted flags
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Approximate download size in MB
    pub size_mb: u64,
    /// Capability tags
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Model repository on HuggingFace
    pub repo_id: String,
    /// GGUF weights filename inside `repo_id`
    pub filename: String,
    /// Repository holding `tokenizer.json`
    pub tokenizer_repo: String,
    /// Approximate RAM required in GB
    pub ram_required_gb: f64,
}

impl ModelDescriptor {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read model catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Model catalog {0} contains no models")]
    Empty(PathBuf),
}

/// Ordered set of model descriptors (largest first)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(mut models: Vec<ModelDescriptor>) -> Self {
        models.sort_by(|a, b| b.ram_required_gb.total_cmp(&a.ram_required_gb));
        Self { models }
    }

    /// Catalog compiled into the binary
    pub fn builtin() -> Self {
        let qwen = |id: &str, display: &str, size: &str, size_mb: u64, ram: f64| ModelDescriptor {
            id: id.to_string(),
            display_name: display.to_string(),
            size_mb,
            capabilities: vec![
                Capability::Chat,
                Capability::Summarization,
                Capability::Multilingual,
            ],
            repo_id: format!("Qwen/Qwen2.5-{}-Instruct-GGUF", size),
            filename: format!("qwen2.5-{}-instruct-q4_k_m.gguf", size.to_lowercase()),
            tokenizer_repo: format!("Qwen/Qwen2.5-{}-Instruct", size),
            ram_required_gb: ram,
        };

        Self::new(vec![
            qwen("qwen2.5-3b-instruct", "Qwen2.5 3B Instruct", "3B", 2100, 4.0),
            qwen("qwen2.5-1.5b-instruct", "Qwen2.5 1.5B Instruct", "1.5B", 1120, 2.5),
            qwen("qwen2.5-0.5b-instruct", "Qwen2.5 0.5B Instruct", "0.5B", 490, 1.5),
        ])
    }

    /// Loads a catalog from a JSON array of descriptors
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let models: Vec<ModelDescriptor> =
            serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if models.is_empty() {
            return Err(CatalogError::Empty(path.to_path_buf()));
        }
        debug!("Loaded {} models from {}", models.len(), path.display());
        Ok(Self::new(models))
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Picks the largest model that fits in usable RAM.
    ///
    /// Usable RAM keeps back 25% of what is available, and never less than 2GB.
    pub fn recommended(&self, capabilities: &HardwareCapabilities) -> Option<&ModelDescriptor> {
        let available_gb = capabilities.available_ram_gb();
        let system_reserve_gb = (available_gb * 0.25).max(2.0);
        let usable_gb = (available_gb - system_reserve_gb).max(0.0);

        debug!(
            "Model selection: {:.1}GB available, {:.1}GB reserved, {:.1}GB usable",
            available_gb, system_reserve_gb, usable_gb
        );

        let selected = self
            .models
            .iter()
            .find(|model| model.ram_required_gb <= usable_gb);

        if let Some(model) = selected {
            info!(
                "Recommended model: {} (requires {:.1}GB RAM)",
                model.display_name, model.ram_required_gb
            );
        }
        selected
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_caps(available_gb: f64, total_gb: f64) -> HardwareCapabilities {
        HardwareCapabilities {
            total_ram_bytes: (total_gb * 1024.0 * 1024.0 * 1024.0) as u64,
            available_ram_bytes: (available_gb * 1024.0 * 1024.0 * 1024.0) as u64,
            cuda_available: false,
            metal_available: false,
            cpu_cores: 8,
        }
    }

    #[test]
    fn test_builtin_lookup() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.get("qwen2.5-1.5b-instruct").unwrap();
        assert_eq!(model.repo_id, "Qwen/Qwen2.5-1.5B-Instruct-GGUF");
        assert_eq!(model.filename, "qwen2.5-1.5b-instruct-q4_k_m.gguf");
        assert!(model.has_capability(Capability::Summarization));
        assert!(catalog.get("llama-70b").is_none());
    }

    #[test]
    fn test_builtin_sorted_largest_first() {
        let catalog = ModelCatalog::builtin();
        let ram: Vec<f64> = catalog.models().iter().map(|m| m.ram_required_gb).collect();
        assert_eq!(ram, vec![4.0, 2.5, 1.5]);
    }

    #[test]
    fn test_recommended_with_plenty_ram() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.recommended(&make_caps(10.0, 16.0)).unwrap();
        assert_eq!(model.id, "qwen2.5-3b-instruct");
    }

    #[test]
    fn test_recommended_with_limited_ram() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.recommended(&make_caps(4.0, 8.0)).unwrap();
        assert_eq!(model.id, "qwen2.5-0.5b-instruct");
    }

    #[test]
    fn test_no_recommendation_with_insufficient_ram() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.recommended(&make_caps(2.0, 3.0)).is_none());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"tiny","display_name":"Tiny","size_mb":10,"repo_id":"a/b","filename":"t.gguf","tokenizer_repo":"a/c","ram_required_gb":0.5}}]"#
        )
        .unwrap();

        let catalog = ModelCatalog::from_file(file.path()).unwrap();
        let tiny = catalog.get("tiny").unwrap();
        assert!(tiny.capabilities.is_empty());
        assert_eq!(tiny.size_mb, 10);
    }

    #[test]
    fn test_from_file_rejects_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        assert!(matches!(
            ModelCatalog::from_file(file.path()),
            Err(CatalogError::Empty(_))
        ));
    }
}
