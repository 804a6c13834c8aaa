//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Preparing { model } => {
                info!(model = %model, "Preparing model");
            }
            ProgressEvent::LoadingLocal { model } => {
                debug!(model = %model, "Loading model from local cache");
            }
            ProgressEvent::Downloading { model, fraction } => {
                debug!(model = %model, percent = (fraction * 100.0) as u32, "Downloading model");
            }
            ProgressEvent::ModelReady {
                model,
                source,
                load_time,
            } => {
                info!(
                    model = %model,
                    source = %source,
                    load_time_ms = load_time.as_millis(),
                    "Model ready"
                );
            }
            ProgressEvent::ModelLoadFailed { model, error } => {
                warn!(model = %model, error = %error, "Model load failed");
            }
            ProgressEvent::ModelUnloaded { model } => {
                info!(model = %model, "Model unloaded");
            }
            ProgressEvent::GenerationFinished {
                model,
                tokens,
                tokens_per_second,
            } => {
                debug!(
                    model = %model,
                    tokens,
                    tokens_per_second = format!("{:.1}", tokens_per_second),
                    "Generation finished"
                );
            }
            ProgressEvent::StageChanged { stage, progress } => {
                info!(stage = %stage, progress = format!("{:.2}", progress), "Pipeline stage");
            }
            ProgressEvent::ChunkSummarized { index, total } => {
                debug!(progress = format!("{}/{}", index + 1, total), "Chunk summarized");
            }
        }
    }
}
