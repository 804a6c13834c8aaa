//! Progress handler trait and events

use std::time::Duration;

/// Where a model handle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionSource {
    LocalCache,
    Network,
    /// Local cache, after the network attempt failed
    LocalFallback,
}

impl std::fmt::Display for AcquisitionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionSource::LocalCache => write!(f, "local cache"),
            AcquisitionSource::Network => write!(f, "network"),
            AcquisitionSource::LocalFallback => write!(f, "local fallback"),
        }
    }
}

/// Events emitted by the model lifecycle, generation and summarization
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A load request needs to acquire a model
    Preparing { model: String },

    /// Local-cache-only acquisition started
    LoadingLocal { model: String },

    /// Network acquisition progress
    Downloading { model: String, fraction: f64 },

    /// Model is resident
    ModelReady {
        model: String,
        source: AcquisitionSource,
        load_time: Duration,
    },

    /// Acquisition failed
    ModelLoadFailed { model: String, error: String },

    /// Resident model dropped
    ModelUnloaded { model: String },

    /// Generation finished (any halt reason)
    GenerationFinished {
        model: String,
        tokens: usize,
        tokens_per_second: f64,
    },

    /// Summarization pipeline changed stage
    StageChanged { stage: String, progress: f64 },

    /// One chunk summary produced
    ChunkSummarized { index: usize, total: usize },
}

impl ProgressEvent {
    /// Short status line for display
    pub fn status_line(&self) -> String {
        match self {
            ProgressEvent::Preparing { .. } => "Preparing…".to_string(),
            ProgressEvent::LoadingLocal { .. } => "Loading local model…".to_string(),
            ProgressEvent::Downloading { fraction, .. } => {
                format!("Downloading: {:.0}%", (fraction * 100.0).clamp(0.0, 100.0))
            }
            ProgressEvent::ModelReady { .. } => "Ready".to_string(),
            ProgressEvent::ModelLoadFailed { error, .. } => format!("Failed: {}", error),
            ProgressEvent::ModelUnloaded { .. } => "Idle".to_string(),
            ProgressEvent::GenerationFinished {
                tokens_per_second, ..
            } => format!("Done ({:.1} tok/s)", tokens_per_second),
            ProgressEvent::StageChanged { stage, .. } => format!("{}…", stage),
            ProgressEvent::ChunkSummarized { index, total } => {
                format!("Summarized section {}/{}", index + 1, total)
            }
        }
    }
}

/// Receives progress events
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_counting_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::Preparing {
            model: "m".to_string(),
        });
        handler.on_progress(&ProgressEvent::ChunkSummarized { index: 0, total: 2 });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_status_lines() {
        let downloading = ProgressEvent::Downloading {
            model: "m".to_string(),
            fraction: 0.42,
        };
        assert_eq!(downloading.status_line(), "Downloading: 42%");

        let local = ProgressEvent::LoadingLocal {
            model: "m".to_string(),
        };
        assert_eq!(local.status_line(), "Loading local model…");

        let chunk = ProgressEvent::ChunkSummarized { index: 1, total: 3 };
        assert_eq!(chunk.status_line(), "Summarized section 2/3");
    }

    #[test]
    fn test_download_fraction_clamped() {
        let over = ProgressEvent::Downloading {
            model: "m".to_string(),
            fraction: 1.7,
        };
        assert_eq!(over.status_line(), "Downloading: 100%");
    }
}
