//! Persisted key-value flags
//!
//! The lifecycle manager keeps two kinds of flags here: `model_installed.<id>` once a model
//! has been fully acquired, and the process-wide `offline_mode` preference.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Key of the offline preference
pub const OFFLINE_MODE_KEY: &str = "offline_mode";

/// Key of the installed flag for a model
pub fn installed_key(model_id: &str) -> String {
    format!("model_installed.{}", model_id)
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Boolean key-value store
pub trait SettingsStore: Send + Sync {
    /// Returns the stored value, `false` when unset
    fn get_bool(&self, key: &str) -> bool;

    fn set_bool(&self, key: &str, value: bool) -> Result<(), SettingsError>;
}

/// In-memory store, used in tests and for ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, bool>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `pairs`
    pub fn with_values<'a>(pairs: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get_bool(&self, key: &str) -> bool {
        self.values
            .lock()
            .map(|values| values.get(key).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// JSON object on disk, rewritten on every change
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileSettings {
    /// Opens the settings file; a missing or unreadable file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Ignoring malformed settings file {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!("Failed to read settings file {}: {}", path.display(), e);
                Map::new()
            }
        };
        debug!("Settings loaded from {} ({} keys)", path.display(), values.len());

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let serialized = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_bool(&self, key: &str) -> bool {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        let mut values = match self.values.lock() {
            Ok(values) => values,
            Err(poisoned) => poisoned.into_inner(),
        };
        values.insert(key.to_string(), Value::Bool(value));
        self.persist(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_settings_default_false() {
        let store = MemorySettings::new();
        assert!(!store.get_bool(OFFLINE_MODE_KEY));
        store.set_bool(OFFLINE_MODE_KEY, true).unwrap();
        assert!(store.get_bool(OFFLINE_MODE_KEY));
    }

    #[test]
    fn test_installed_key_format() {
        assert_eq!(installed_key("qwen"), "model_installed.qwen");
    }

    #[test]
    fn test_json_settings_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = JsonFileSettings::open(&path);
        assert!(!store.get_bool(&installed_key("m")));
        store.set_bool(&installed_key("m"), true).unwrap();

        let reopened = JsonFileSettings::open(&path);
        assert!(reopened.get_bool(&installed_key("m")));
        assert!(!reopened.get_bool(OFFLINE_MODE_KEY));
    }

    #[test]
    fn test_json_settings_malformed_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileSettings::open(&path);
        assert!(!store.get_bool(OFFLINE_MODE_KEY));
        store.set_bool(OFFLINE_MODE_KEY, true).unwrap();
        assert!(JsonFileSettings::open(&path).get_bool(OFFLINE_MODE_KEY));
    }
}
