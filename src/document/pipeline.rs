//! Map-reduce document summarization
//!
//! A document is extracted, chunked, summarized one chunk at a time, and the chunk
//! summaries are merged in a final generation. Progress is published on a watch channel:
//!
//! | State       | Progress      |
//! |-------------|---------------|
//! | Loading     | 0.1           |
//! | Chunking    | 0.3           |
//! | Summarizing | 0.5 to 0.8    |
//! | Finalizing  | 0.8           |
//! | Complete    | 1.0           |
//!
//! Cancellation is checked before every chunk and before the merge, and the in-flight
//! generation watches the same flag. A cancelled run discards its partial results and
//! returns [`SummaryOutcome::Cancelled`].

use super::chunker;
use super::cleanup::{clean_model_output, document_title, truncate_chars};
use super::error::DocumentError;
use super::extract::{DocumentKind, PlainTextExtractor, TextExtractor};
use crate::llm::{GenerationEngine, GenerationParams, PromptHistory};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const CHUNK_SYSTEM_PROMPT: &str = "You are an expert document summarizer.";
const CHUNK_PROMPT: &str = "Provide a concise but comprehensive summary of the following document section. \
Capture the key points, facts, and conclusions.\n\n<section>\n{}\n</section>";

const MERGE_SYSTEM_PROMPT: &str = "You are an expert at synthesizing document summaries.";
const MERGE_PROMPT: &str = "The following are summaries of consecutive sections of one document. \
Combine them into a single coherent summary that keeps all important details, organized logically.\n\n\
<summaries>\n{}\n</summaries>";

const LOADING_PROGRESS: f64 = 0.1;
const CHUNKING_PROGRESS: f64 = 0.3;
const SUMMARIZING_START: f64 = 0.5;
const SUMMARIZING_END: f64 = 0.8;

/// Pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ProcessingState {
    Idle,
    Loading,
    Chunking,
    Summarizing,
    Finalizing,
    Complete,
    Error(String),
}

impl ProcessingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Complete | ProcessingState::Error(_))
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingState::Idle => write!(f, "Idle"),
            ProcessingState::Loading => write!(f, "Loading document"),
            ProcessingState::Chunking => write!(f, "Splitting into sections"),
            ProcessingState::Summarizing => write!(f, "Summarizing sections"),
            ProcessingState::Finalizing => write!(f, "Writing final summary"),
            ProcessingState::Complete => write!(f, "Complete"),
            ProcessingState::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

/// State and progress fraction, published together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub state: ProcessingState,
    pub progress: f64,
}

impl Default for PipelineSnapshot {
    fn default() -> Self {
        Self {
            state: ProcessingState::Idle,
            progress: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummarizationConfig {
    pub model_id: String,
    /// Chunk ceiling in chars; chunk prompts are truncated to it as well
    pub max_chunk_size: usize,
    /// Ceiling in chars on the concatenated chunk summaries fed to the merge step
    pub max_summary_input_size: usize,
    pub params: GenerationParams,
}

impl SummarizationConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            max_chunk_size: 2000,
            max_summary_input_size: 8000,
            params: GenerationParams::default(),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub title: String,
    pub summary: String,
    pub chunk_summaries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    Completed(DocumentSummary),
    Cancelled,
}

#[derive(Debug, Default)]
struct Results {
    title: Option<String>,
    summary: Option<String>,
    chunk_summaries: Vec<String>,
}

pub struct SummarizationPipeline {
    engine: GenerationEngine,
    extractor: Arc<dyn TextExtractor>,
    config: SummarizationConfig,
    cancelled: Arc<AtomicBool>,
    snapshot: watch::Sender<PipelineSnapshot>,
    results: Mutex<Results>,
    progress: Arc<dyn ProgressHandler>,
}

impl SummarizationPipeline {
    pub fn new(engine: GenerationEngine, config: SummarizationConfig) -> Self {
        let (snapshot, _) = watch::channel(PipelineSnapshot::default());
        Self {
            engine,
            extractor: Arc::new(PlainTextExtractor),
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            snapshot,
            results: Mutex::new(Results::default()),
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = handler;
        self
    }

    pub fn config(&self) -> &SummarizationConfig {
        &self.config
    }

    /// Summarizes the document at `path`.
    ///
    /// Failures move the pipeline to [`ProcessingState::Error`] and are returned.
    pub async fn process_document(&self, path: &Path) -> Result<SummaryOutcome, DocumentError> {
        self.cancelled.store(false, Ordering::SeqCst);
        self.reset_results();
        info!(path = %path.display(), model = %self.config.model_id, "Summarizing document");

        self.set_state(ProcessingState::Loading, LOADING_PROGRESS);
        let kind = DocumentKind::from_path(path);
        let text = self
            .extractor
            .extract(path, &kind)
            .map_err(|e| self.fail(e))?;

        if self.is_cancelled() {
            return Ok(self.abandon());
        }

        self.set_state(ProcessingState::Chunking, CHUNKING_PROGRESS);
        let chunks = chunker::chunk(&text, self.config.max_chunk_size);
        if chunks.is_empty() {
            return Err(self.fail(DocumentError::ExtractionFailed {
                path: path.to_path_buf(),
                message: "document contains no text".to_string(),
            }));
        }
        debug!(chunks = chunks.len(), kind = %kind, "Document chunked");

        self.set_state(ProcessingState::Summarizing, SUMMARIZING_START);
        let total = chunks.len();
        let mut chunk_summaries = Vec::with_capacity(total);

        for chunk in &chunks {
            if self.is_cancelled() {
                return Ok(self.abandon());
            }

            let section = truncate_chars(chunk.text(), self.config.max_chunk_size);
            let prompt = CHUNK_PROMPT.replace("{}", section);
            let summary = self.summarize(CHUNK_SYSTEM_PROMPT, prompt).await?;

            if self.is_cancelled() {
                return Ok(self.abandon());
            }

            chunk_summaries.push(summary.clone());
            self.with_results(|r| r.chunk_summaries.push(summary));

            let done = chunk.index() + 1;
            let span = SUMMARIZING_END - SUMMARIZING_START;
            let progress = SUMMARIZING_START + span * done as f64 / total as f64;
            self.set_state(ProcessingState::Summarizing, progress);
            self.progress.on_progress(&ProgressEvent::ChunkSummarized {
                index: chunk.index(),
                total,
            });
        }

        if self.is_cancelled() {
            return Ok(self.abandon());
        }

        self.set_state(ProcessingState::Finalizing, SUMMARIZING_END);
        let combined = chunk_summaries.join("\n\n");
        let merge_input = truncate_chars(&combined, self.config.max_summary_input_size);
        if merge_input.len() < combined.len() {
            debug!(
                limit = self.config.max_summary_input_size,
                "Chunk summaries truncated for merge"
            );
        }
        let summary = self
            .summarize(MERGE_SYSTEM_PROMPT, MERGE_PROMPT.replace("{}", merge_input))
            .await?;

        if self.is_cancelled() {
            return Ok(self.abandon());
        }

        let title = document_title(path);
        self.with_results(|r| {
            r.title = Some(title.clone());
            r.summary = Some(summary.clone());
        });
        self.set_state(ProcessingState::Complete, 1.0);
        info!(title = %title, sections = total, "Document summarized");

        Ok(SummaryOutcome::Completed(DocumentSummary {
            title,
            summary,
            chunk_summaries,
        }))
    }

    async fn summarize(
        &self,
        system_prompt: &str,
        prompt: String,
    ) -> Result<String, DocumentError> {
        let history = PromptHistory::single_user(prompt);
        let config = &self.config;
        let generation = self
            .engine
            .try_generate_with_abort(
                &config.model_id,
                &history,
                system_prompt,
                config.params,
                Arc::clone(&self.cancelled),
            )
            .await
            .map_err(|e| self.fail(e.into()))?;
        Ok(clean_model_output(&generation.text))
    }

    /// Stops the run at its next checkpoint, halting the in-flight generation too
    pub fn cancel_processing(&self) {
        info!("Summarization cancel requested");
        self.cancelled.store(true, Ordering::SeqCst);
        self.engine.stop();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state(&self) -> ProcessingState {
        self.snapshot.borrow().state.clone()
    }

    pub fn progress(&self) -> f64 {
        self.snapshot.borrow().progress
    }

    pub fn document_title(&self) -> Option<String> {
        self.read_results(|r| r.title.clone())
    }

    pub fn document_summary(&self) -> Option<String> {
        self.read_results(|r| r.summary.clone())
    }

    /// Summaries produced so far, in document order
    pub fn chunk_summaries(&self) -> Vec<String> {
        self.read_results(|r| r.chunk_summaries.clone())
    }

    fn set_state(&self, state: ProcessingState, progress: f64) {
        self.progress.on_progress(&ProgressEvent::StageChanged {
            stage: state.to_string(),
            progress,
        });
        self.snapshot.send_replace(PipelineSnapshot { state, progress });
    }

    fn fail(&self, error: DocumentError) -> DocumentError {
        warn!(error = %error, "Summarization failed");
        self.set_state(ProcessingState::Error(error.to_string()), self.progress());
        error
    }

    fn abandon(&self) -> SummaryOutcome {
        info!("Summarization cancelled");
        self.reset_results();
        self.snapshot.send_replace(PipelineSnapshot::default());
        SummaryOutcome::Cancelled
    }

    fn reset_results(&self) {
        self.with_results(|r| *r = Results::default());
    }

    fn with_results(&self, update: impl FnOnce(&mut Results)) {
        let mut results = match self.results.lock() {
            Ok(results) => results,
            Err(poisoned) => poisoned.into_inner(),
        };
        update(&mut results);
    }

    fn read_results<T>(&self, read: impl FnOnce(&Results) -> T) -> T {
        let results = match self.results.lock() {
            Ok(results) => results,
            Err(poisoned) => poisoned.into_inner(),
        };
        read(&results)
    }
}

impl std::fmt::Debug for SummarizationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizationPipeline")
            .field("config", &self.config)
            .field("snapshot", &*self.snapshot.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_and_terminal() {
        assert!(ProcessingState::Complete.is_terminal());
        assert!(ProcessingState::Error("x".to_string()).is_terminal());
        assert!(!ProcessingState::Summarizing.is_terminal());
        assert_eq!(ProcessingState::Error("boom".to_string()).to_string(), "Error: boom");
    }

    #[test]
    fn test_snapshot_serializes_state_tag() {
        let snapshot = PipelineSnapshot {
            state: ProcessingState::Error("bad".to_string()),
            progress: 0.1,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"]["state"], "error");
        assert_eq!(json["state"]["message"], "bad");
    }

    #[test]
    fn test_default_config() {
        let config = SummarizationConfig::new("m");
        assert_eq!(config.max_chunk_size, 2000);
        assert_eq!(config.max_summary_input_size, 8000);
    }
}
