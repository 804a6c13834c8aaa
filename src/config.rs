//! Configuration management for pocketmind
//!
//! Settings are loaded from environment variables with sensible defaults.
//!
//! # Environment Variables
//!
//! - `POCKETMIND_MODEL`: Model id from the catalog - default: the largest model that fits
//!   in available RAM, else "qwen2.5-1.5b-instruct"
//! - `POCKETMIND_CATALOG`: Path to a JSON model catalog - default: built-in catalog
//! - `POCKETMIND_MODEL_DIR`: Model cache directory - default: the HuggingFace hub cache
//! - `POCKETMIND_SETTINGS`: Persisted flags file - default: `<config dir>/pocketmind/settings.json`
//! - `POCKETMIND_TEMPERATURE`: Sampling temperature - default: "0.7"
//! - `POCKETMIND_MAX_TOKENS`: Token budget per generation - default: "1024"
//! - `POCKETMIND_PUBLISH_CADENCE`: Publish decoded text every N tokens - default: "4"
//! - `POCKETMIND_MAX_CHUNK_SIZE`: Summarization chunk ceiling in chars - default: "2000"
//! - `POCKETMIND_MAX_SUMMARY_INPUT`: Merge input ceiling in chars - default: "8000"
//! - `POCKETMIND_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use pocketmind::AssistantConfig;
//!
//! let config = AssistantConfig::default();
//! config.validate().expect("Invalid configuration");
//! let catalog = config.load_catalog().expect("Invalid catalog");
//! ```

use crate::document::SummarizationConfig;
use crate::llm::{
    CatalogError, GenerationParams, HardwareCapabilities, ModelCatalog, SamplingConfig,
};
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Default values for configuration
pub const FALLBACK_MODEL: &str = "qwen2.5-1.5b-instruct";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: usize = 1024;
const DEFAULT_PUBLISH_CADENCE: usize = 4;
const DEFAULT_MAX_CHUNK_SIZE: usize = 2000;
const DEFAULT_MAX_SUMMARY_INPUT: usize = 8000;
const MAX_TOKENS_LIMIT: usize = 32_768;
const MIN_CHUNK_SIZE: usize = 100;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Model catalog could not be loaded
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Requested model is not in the catalog
    #[error("Unknown model '{0}'. Run `pocketmind models list` to see available models")]
    UnknownModel(String),
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Explicit model id; `None` picks one from the catalog for this machine
    pub model: Option<String>,

    /// JSON catalog overriding the built-in one
    pub catalog_path: Option<PathBuf>,

    /// Model cache directory
    pub model_dir: Option<PathBuf>,

    /// Persisted flags (installed models, offline mode)
    pub settings_path: PathBuf,

    pub temperature: f64,

    pub max_tokens: usize,

    pub publish_cadence: usize,

    /// Summarization chunk ceiling, in chars
    pub max_chunk_size: usize,

    /// Summarization merge input ceiling, in chars
    pub max_summary_input_size: usize,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(env::temp_dir)
        .join("pocketmind")
        .join("settings.json")
}

impl Default for AssistantConfig {
    /// Loads from `POCKETMIND_*` environment variables, falling back to defaults
    fn default() -> Self {
        let model = env::var("POCKETMIND_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty());

        let catalog_path = env::var("POCKETMIND_CATALOG").ok().map(PathBuf::from);
        let model_dir = env::var("POCKETMIND_MODEL_DIR").ok().map(PathBuf::from);
        let settings_path = env::var("POCKETMIND_SETTINGS")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(default_settings_path);

        let log_level = env::var("POCKETMIND_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            model,
            catalog_path,
            model_dir,
            settings_path,
            temperature: env_parse("POCKETMIND_TEMPERATURE").unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: env_parse("POCKETMIND_MAX_TOKENS").unwrap_or(DEFAULT_MAX_TOKENS),
            publish_cadence: env_parse("POCKETMIND_PUBLISH_CADENCE")
                .unwrap_or(DEFAULT_PUBLISH_CADENCE),
            max_chunk_size: env_parse("POCKETMIND_MAX_CHUNK_SIZE")
                .unwrap_or(DEFAULT_MAX_CHUNK_SIZE),
            max_summary_input_size: env_parse("POCKETMIND_MAX_SUMMARY_INPUT")
                .unwrap_or(DEFAULT_MAX_SUMMARY_INPUT),
            log_level,
        }
    }
}

impl AssistantConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` describing the first invalid value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(format!(
                "Temperature must be between 0 and 2 (got {})",
                self.temperature
            )));
        }

        if self.max_tokens == 0 || self.max_tokens > MAX_TOKENS_LIMIT {
            return Err(ConfigError::ValidationFailed(format!(
                "Max tokens must be between 1 and {} (got {})",
                MAX_TOKENS_LIMIT, self.max_tokens
            )));
        }

        if self.publish_cadence == 0 {
            return Err(ConfigError::ValidationFailed(
                "Publish cadence must be at least 1 token".to_string(),
            ));
        }

        if self.max_chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::ValidationFailed(format!(
                "Max chunk size must be at least {} characters",
                MIN_CHUNK_SIZE
            )));
        }

        if self.max_summary_input_size < self.max_chunk_size {
            return Err(ConfigError::ValidationFailed(
                "Max summary input must be at least the max chunk size".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// The configured catalog file, or the built-in catalog
    pub fn load_catalog(&self) -> Result<ModelCatalog, ConfigError> {
        match &self.catalog_path {
            Some(path) => Ok(ModelCatalog::from_file(path)?),
            None => Ok(ModelCatalog::builtin()),
        }
    }

    /// Model id to use: the explicit one if set, else the best fit for `capabilities`
    pub fn resolve_model(
        &self,
        catalog: &ModelCatalog,
        capabilities: &HardwareCapabilities,
    ) -> Result<String, ConfigError> {
        if let Some(model) = &self.model {
            return catalog
                .get(model)
                .map(|d| d.id.clone())
                .ok_or_else(|| ConfigError::UnknownModel(model.clone()));
        }

        let id = catalog
            .recommended(capabilities)
            .map(|d| d.id.clone())
            .unwrap_or_else(|| FALLBACK_MODEL.to_string());
        debug!(model = %id, "Model selected for available RAM");
        Ok(id)
    }

    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig::with_temperature(self.temperature)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams::new(self.max_tokens).with_publish_cadence(self.publish_cadence)
    }

    pub fn summarization(&self, model_id: &str) -> SummarizationConfig {
        SummarizationConfig {
            model_id: model_id.to_string(),
            max_chunk_size: self.max_chunk_size,
            max_summary_input_size: self.max_summary_input_size,
            params: self.generation_params(),
        }
    }

    /// Converts configuration to a display map for output formatting
    pub fn to_display_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();

        map.insert(
            "model".to_string(),
            self.model.clone().unwrap_or_else(|| "auto".to_string()),
        );
        if let Some(ref path) = self.catalog_path {
            map.insert("catalog".to_string(), path.display().to_string());
        }
        if let Some(ref dir) = self.model_dir {
            map.insert("model_dir".to_string(), dir.display().to_string());
        }
        map.insert(
            "settings".to_string(),
            self.settings_path.display().to_string(),
        );
        map.insert("temperature".to_string(), self.temperature.to_string());
        map.insert("max_tokens".to_string(), self.max_tokens.to_string());
        map.insert(
            "publish_cadence".to_string(),
            self.publish_cadence.to_string(),
        );
        map.insert("max_chunk_size".to_string(), self.max_chunk_size.to_string());
        map.insert(
            "max_summary_input_size".to_string(),
            self.max_summary_input_size.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pocketmind Configuration:")?;
        writeln!(f, "  Model: {}", self.model.as_deref().unwrap_or("auto"))?;
        match &self.catalog_path {
            Some(path) => writeln!(f, "  Catalog: {}", path.display())?,
            None => writeln!(f, "  Catalog: built-in")?,
        }
        if let Some(ref dir) = self.model_dir {
            writeln!(f, "  Model Dir: {}", dir.display())?;
        }
        writeln!(f, "  Settings: {}", self.settings_path.display())?;
        writeln!(f, "  Temperature: {}", self.temperature)?;
        writeln!(f, "  Max Tokens: {}", self.max_tokens)?;
        writeln!(f, "  Publish Cadence: {} tokens", self.publish_cadence)?;
        writeln!(f, "  Max Chunk Size: {} chars", self.max_chunk_size)?;
        writeln!(f, "  Max Summary Input: {} chars", self.max_summary_input_size)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "POCKETMIND_MODEL",
        "POCKETMIND_CATALOG",
        "POCKETMIND_MODEL_DIR",
        "POCKETMIND_SETTINGS",
        "POCKETMIND_TEMPERATURE",
        "POCKETMIND_MAX_TOKENS",
        "POCKETMIND_PUBLISH_CADENCE",
        "POCKETMIND_MAX_CHUNK_SIZE",
        "POCKETMIND_MAX_SUMMARY_INPUT",
        "POCKETMIND_LOG_LEVEL",
    ];

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn clean_env() -> Vec<EnvGuard> {
        VARS.iter().map(|k| EnvGuard::unset(k)).collect()
    }

    fn caps(available_gb: u64) -> HardwareCapabilities {
        HardwareCapabilities {
            total_ram_bytes: 32 * 1024 * 1024 * 1024,
            available_ram_bytes: available_gb * 1024 * 1024 * 1024,
            cuda_available: false,
            metal_available: false,
            cpu_cores: 8,
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = clean_env();

        let config = AssistantConfig::default();

        assert!(config.model.is_none());
        assert!(config.catalog_path.is_none());
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.publish_cadence, DEFAULT_PUBLISH_CADENCE);
        assert_eq!(config.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE);
        assert_eq!(config.max_summary_input_size, DEFAULT_MAX_SUMMARY_INPUT);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.settings_path.ends_with("pocketmind/settings.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _clean = clean_env();
        let _guards = vec![
            EnvGuard::set("POCKETMIND_MODEL", "qwen2.5-0.5b-instruct"),
            EnvGuard::set("POCKETMIND_SETTINGS", "/tmp/pm/settings.json"),
            EnvGuard::set("POCKETMIND_TEMPERATURE", "0.2"),
            EnvGuard::set("POCKETMIND_MAX_TOKENS", "256"),
            EnvGuard::set("POCKETMIND_PUBLISH_CADENCE", "1"),
            EnvGuard::set("POCKETMIND_MAX_CHUNK_SIZE", "500"),
            EnvGuard::set("POCKETMIND_LOG_LEVEL", "DEBUG"),
        ];

        let config = AssistantConfig::default();

        assert_eq!(config.model.as_deref(), Some("qwen2.5-0.5b-instruct"));
        assert_eq!(config.settings_path, PathBuf::from("/tmp/pm/settings.json"));
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.publish_cadence, 1);
        assert_eq!(config.max_chunk_size, 500);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back() {
        let _clean = clean_env();
        let _guard = EnvGuard::set("POCKETMIND_MAX_TOKENS", "lots");

        assert_eq!(AssistantConfig::default().max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    #[serial]
    fn test_validation_rejects_bad_values() {
        let _clean = clean_env();
        let base = AssistantConfig::default();

        let mut config = base.clone();
        config.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.max_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.max_summary_input_size = config.max_chunk_size - 1;
        assert!(config.validate().is_err());

        let mut config = base;
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_model() {
        let _clean = clean_env();
        let catalog = ModelCatalog::builtin();
        let mut config = AssistantConfig::default();

        let auto = config.resolve_model(&catalog, &caps(16)).unwrap();
        assert!(catalog.get(&auto).is_some());

        config.model = Some("missing".to_string());
        assert!(matches!(
            config.resolve_model(&catalog, &caps(16)),
            Err(ConfigError::UnknownModel(_))
        ));

        config.model = Some("qwen2.5-0.5b-instruct".to_string());
        assert_eq!(
            config.resolve_model(&catalog, &caps(0)).unwrap(),
            "qwen2.5-0.5b-instruct"
        );
    }

    #[test]
    #[serial]
    fn test_tiny_machine_falls_back() {
        let _clean = clean_env();
        let config = AssistantConfig::default();

        let id = config
            .resolve_model(&ModelCatalog::builtin(), &caps(0))
            .unwrap();
        assert_eq!(id, FALLBACK_MODEL);
    }

    #[test]
    #[serial]
    fn test_config_display() {
        let _clean = clean_env();
        let config = AssistantConfig::default();
        let display = format!("{}", config);
        assert!(display.contains("Pocketmind Configuration:"));
        assert!(display.contains("Model: auto"));
        assert_eq!(config.to_display_map()["max_tokens"], "1024");
    }
}
