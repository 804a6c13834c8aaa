//! Model lifecycle management
//!
//! [`ModelLifecycleManager`] owns the single resident model. `load` is idempotent for the
//! model already in memory; any other model replaces it. Acquisition is offline-first:
//!
//! 1. When the model was installed before, or offline mode is on, try the local cache.
//!    In offline mode a miss fails with [`InferenceError::ModelUnavailableOffline`].
//! 2. Otherwise download (reporting progress). If that fails for a model that was
//!    installed before, retry the local cache once.

use super::catalog::{ModelCatalog, ModelDescriptor};
use super::error::InferenceError;
use super::runtime::{InferenceRuntime, ModelHandle, ProgressCallback};
use crate::progress::{AcquisitionSource, NoOpHandler, ProgressEvent, ProgressHandler};
use crate::settings::{installed_key, SettingsError, SettingsStore, OFFLINE_MODE_KEY};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// The one-slot model cache
pub enum LoadState {
    Idle,
    Loaded {
        descriptor: ModelDescriptor,
        handle: ModelHandle,
    },
}

impl LoadState {
    pub fn model_id(&self) -> Option<&str> {
        match self {
            LoadState::Idle => None,
            LoadState::Loaded { descriptor, .. } => Some(&descriptor.id),
        }
    }
}

impl std::fmt::Debug for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::Idle => write!(f, "Idle"),
            LoadState::Loaded { descriptor, .. } => write!(f, "Loaded({})", descriptor.id),
        }
    }
}

pub struct ModelLifecycleManager {
    runtime: Arc<dyn InferenceRuntime>,
    settings: Arc<dyn SettingsStore>,
    catalog: ModelCatalog,
    state: Mutex<LoadState>,
    status: Arc<watch::Sender<String>>,
    progress: Arc<dyn ProgressHandler>,
}

impl ModelLifecycleManager {
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        settings: Arc<dyn SettingsStore>,
        catalog: ModelCatalog,
    ) -> Self {
        let (status, _) = watch::channel("Idle".to_string());
        Self {
            runtime,
            settings,
            catalog,
            state: Mutex::new(LoadState::Idle),
            status: Arc::new(status),
            progress: Arc::new(NoOpHandler),
        }
    }

    /// Mirrors every status change to `handler`
    pub fn with_progress_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = handler;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Returns a handle to `model_id`, acquiring it if it is not resident
    pub async fn load(&self, model_id: &str) -> Result<ModelHandle, InferenceError> {
        let descriptor = self
            .catalog
            .get(model_id)
            .cloned()
            .ok_or_else(|| InferenceError::ModelNotFound(model_id.to_string()))?;

        let mut state = self.state.lock().await;

        if let LoadState::Loaded {
            descriptor: resident,
            handle,
        } = &*state
        {
            if resident.id == descriptor.id {
                debug!(model = %descriptor.id, "Model already resident");
                return Ok(handle.clone());
            }
        }

        if let Some(previous) = std::mem::replace(&mut *state, LoadState::Idle)
            .model_id()
            .map(str::to_string)
        {
            info!(from = %previous, to = %descriptor.id, "Switching resident model");
            self.report(&ProgressEvent::ModelUnloaded { model: previous });
        }

        self.report(&ProgressEvent::Preparing {
            model: descriptor.id.clone(),
        });
        let started = Instant::now();

        match self.acquire(&descriptor).await {
            Ok((handle, source)) => {
                self.report(&ProgressEvent::ModelReady {
                    model: descriptor.id.clone(),
                    source,
                    load_time: started.elapsed(),
                });
                *state = LoadState::Loaded {
                    descriptor,
                    handle: handle.clone(),
                };
                Ok(handle)
            }
            Err(e) => {
                self.report(&ProgressEvent::ModelLoadFailed {
                    model: descriptor.id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn acquire(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<(ModelHandle, AcquisitionSource), InferenceError> {
        let installed = self.is_installed(&descriptor.id);
        let offline = self.is_offline_mode();

        if installed || offline {
            self.report(&ProgressEvent::LoadingLocal {
                model: descriptor.id.clone(),
            });
            match self.runtime.acquire_local(descriptor).await {
                Ok(handle) => {
                    self.mark_installed(&descriptor.id);
                    return Ok((handle, AcquisitionSource::LocalCache));
                }
                Err(e) if offline => {
                    warn!(model = %descriptor.id, error = %e, "No local copy while offline");
                    return Err(InferenceError::ModelUnavailableOffline(descriptor.id.clone()));
                }
                Err(e) => {
                    debug!(model = %descriptor.id, error = %e, "Local load failed, trying network");
                }
            }
        }

        match self
            .runtime
            .acquire_with_download(descriptor, self.download_progress(&descriptor.id))
            .await
        {
            Ok(handle) => {
                self.mark_installed(&descriptor.id);
                Ok((handle, AcquisitionSource::Network))
            }
            Err(network_error) if installed => {
                warn!(
                    model = %descriptor.id,
                    error = %network_error,
                    "Network acquisition failed, retrying local cache"
                );
                self.report(&ProgressEvent::LoadingLocal {
                    model: descriptor.id.clone(),
                });
                let handle = self.runtime.acquire_local(descriptor).await?;
                Ok((handle, AcquisitionSource::LocalFallback))
            }
            Err(network_error) => Err(network_error),
        }
    }

    fn download_progress(&self, model_id: &str) -> ProgressCallback {
        let status = Arc::clone(&self.status);
        let handler = Arc::clone(&self.progress);
        let model = model_id.to_string();
        let last_percent = AtomicI64::new(-1);

        Box::new(move |fraction: f64| {
            let percent = (fraction.clamp(0.0, 1.0) * 100.0) as i64;
            if last_percent.swap(percent, Ordering::Relaxed) == percent {
                return;
            }
            let event = ProgressEvent::Downloading {
                model: model.clone(),
                fraction,
            };
            handler.on_progress(&event);
            status.send_replace(event.status_line());
        })
    }

    fn mark_installed(&self, model_id: &str) {
        if let Err(e) = self.settings.set_bool(&installed_key(model_id), true) {
            warn!(model = %model_id, error = %e, "Failed to persist installed flag");
        }
    }

    /// Drops the resident model, if any
    pub async fn unload(&self) {
        let mut state = self.state.lock().await;
        if let Some(model) = state.model_id().map(str::to_string) {
            *state = LoadState::Idle;
            self.report(&ProgressEvent::ModelUnloaded { model });
        }
    }

    /// Id of the resident model
    pub async fn resident_model_id(&self) -> Option<String> {
        self.state.lock().await.model_id().map(str::to_string)
    }

    pub fn is_installed(&self, model_id: &str) -> bool {
        self.settings.get_bool(&installed_key(model_id))
    }

    pub fn is_offline_mode(&self) -> bool {
        self.settings.get_bool(OFFLINE_MODE_KEY)
    }

    pub fn set_offline_mode(&self, offline: bool) -> Result<(), SettingsError> {
        info!(offline, "Offline mode changed");
        self.settings.set_bool(OFFLINE_MODE_KEY, offline)
    }

    /// Latest human-readable status
    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }

    pub(crate) fn report(&self, event: &ProgressEvent) {
        self.progress.on_progress(event);
        self.status.send_replace(event.status_line());
    }
}

impl std::fmt::Debug for ModelLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLifecycleManager")
            .field("runtime", &self.runtime.name())
            .field("models", &self.catalog.models().len())
            .field("status", &self.status())
            .finish()
    }
}
