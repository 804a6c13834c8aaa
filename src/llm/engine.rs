//! Text generation on the resident model
//!
//! At most one generation runs per engine. A second call while one is in flight is
//! dropped: batch calls get an empty string, streaming calls a stream that ends at once.
//! [`GenerationEngine::try_generate`] reports the same situation as
//! [`InferenceError::EngineBusy`].
//!
//! Decoding runs on a blocking thread. The cancel flag is checked before every token and
//! again after each publish, so [`GenerationEngine::stop`] takes effect within one token.

use super::error::InferenceError;
use super::lifecycle::ModelLifecycleManager;
use super::prompt::{ChatMlFormatter, PromptFormatter};
use super::runtime::LoadedModel;
use super::types::{
    Generation, GenerationParams, GenerationStats, HaltReason, PromptHistory, SamplingConfig,
};
use crate::progress::ProgressEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Incremental text deltas; ends after the final delta, or after a single error
pub type GenerationStream = ReceiverStream<Result<String, InferenceError>>;

const STREAM_BUFFER: usize = 32;

/// Shared flags and outputs of the current or last generation
#[derive(Debug, Default)]
struct Session {
    running: AtomicBool,
    cancelled: AtomicBool,
    output: Mutex<String>,
    stats: Mutex<Option<GenerationStats>>,
}

impl Session {
    /// Claims the engine, resetting per-call state
    fn try_begin(self: &Arc<Self>) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        self.cancelled.store(false, Ordering::SeqCst);
        self.set_output(String::new());
        if let Ok(mut stats) = self.stats.lock() {
            *stats = None;
        }
        Some(RunningGuard(Arc::clone(self)))
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_output(&self, text: String) {
        if let Ok(mut output) = self.output.lock() {
            *output = text;
        }
    }
}

/// Clears `running` however the generation ends
struct RunningGuard(Arc<Session>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// Turns successive full decodes into append-only deltas.
///
/// Tokens can decode to different text once later tokens arrive (a partial UTF-8
/// sequence shows up as U+FFFD until it completes). Trailing U+FFFD is never emitted.
/// When a decode rewrites text that was already published, emission resumes at the
/// published char count, so the concatenated deltas always equal [`published`].
///
/// [`published`]: DeltaTracker::published
#[derive(Debug, Default)]
pub(crate) struct DeltaTracker {
    published: String,
    published_chars: usize,
}

impl DeltaTracker {
    pub(crate) fn advance(&mut self, full: &str) -> Option<String> {
        let stable = stable_text(full);

        let delta: String = if stable.starts_with(self.published.as_str()) {
            stable[self.published.len()..].to_string()
        } else {
            warn!(
                published = self.published.len(),
                decoded = stable.len(),
                "Decoded text rewrote published output, resuming after it"
            );
            stable.chars().skip(self.published_chars).collect()
        };

        if delta.is_empty() {
            return None;
        }
        self.published.push_str(&delta);
        self.published_chars += delta.chars().count();
        Some(delta)
    }

    pub(crate) fn published(&self) -> &str {
        &self.published
    }
}

struct DecodeOutcome {
    text: String,
    tokens: usize,
    halt: HaltReason,
}

struct EngineInner {
    models: Arc<ModelLifecycleManager>,
    sampling: SamplingConfig,
    formatter: Arc<dyn PromptFormatter>,
    session: Arc<Session>,
}

/// Produces text from the model managed by a [`ModelLifecycleManager`]
#[derive(Clone)]
pub struct GenerationEngine {
    inner: Arc<EngineInner>,
}

impl GenerationEngine {
    pub fn new(models: Arc<ModelLifecycleManager>, sampling: SamplingConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                models,
                sampling,
                formatter: Arc::new(ChatMlFormatter),
                session: Arc::new(Session::default()),
            }),
        }
    }

    pub fn with_formatter(
        models: Arc<ModelLifecycleManager>,
        sampling: SamplingConfig,
        formatter: Arc<dyn PromptFormatter>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                models,
                sampling,
                formatter,
                session: Arc::new(Session::default()),
            }),
        }
    }

    pub fn models(&self) -> &Arc<ModelLifecycleManager> {
        &self.inner.models
    }

    /// Generates a complete reply.
    ///
    /// Never fails: errors come back as an explanation for the user, and a call made
    /// while another generation is running returns an empty string.
    pub async fn generate(
        &self,
        model_id: &str,
        history: &PromptHistory,
        system_prompt: &str,
        params: GenerationParams,
    ) -> String {
        let Some(guard) = self.inner.session.try_begin() else {
            debug!(model = %model_id, "Generation already running, request dropped");
            return String::new();
        };

        let request = Request::new(model_id, history, system_prompt, params);
        match Arc::clone(&self.inner).run(guard, request, None, true).await {
            Ok(generation) => generation.text,
            Err(e) => e.user_message(),
        }
    }

    /// Like [`generate`](Self::generate), but surfaces failures and the busy case
    pub async fn try_generate(
        &self,
        model_id: &str,
        history: &PromptHistory,
        system_prompt: &str,
        params: GenerationParams,
    ) -> Result<Generation, InferenceError> {
        let Some(guard) = self.inner.session.try_begin() else {
            debug!(model = %model_id, "Generation already running, request dropped");
            return Err(InferenceError::EngineBusy);
        };

        let request = Request::new(model_id, history, system_prompt, params);
        Arc::clone(&self.inner).run(guard, request, None, false).await
    }

    /// Like [`try_generate`](Self::try_generate), and also halts once `abort` is set.
    ///
    /// `abort` is owned by the caller, so a cancel raised before this call claims the
    /// engine is still honored.
    pub async fn try_generate_with_abort(
        &self,
        model_id: &str,
        history: &PromptHistory,
        system_prompt: &str,
        params: GenerationParams,
        abort: Arc<AtomicBool>,
    ) -> Result<Generation, InferenceError> {
        let Some(guard) = self.inner.session.try_begin() else {
            debug!(model = %model_id, "Generation already running, request dropped");
            return Err(InferenceError::EngineBusy);
        };

        let request = Request::new(model_id, history, system_prompt, params).with_abort(abort);
        Arc::clone(&self.inner).run(guard, request, None, false).await
    }

    /// Streams the reply as it is decoded.
    ///
    /// Concatenating the yielded deltas gives the published text. A failure is yielded
    /// as one `Err` item, after which the stream ends. Dropping the stream stops decoding.
    pub fn generate_stream(
        &self,
        model_id: &str,
        history: &PromptHistory,
        system_prompt: &str,
        params: GenerationParams,
    ) -> GenerationStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        let Some(guard) = self.inner.session.try_begin() else {
            debug!(model = %model_id, "Generation already running, stream closed");
            return ReceiverStream::new(rx);
        };

        let inner = Arc::clone(&self.inner);
        let request = Request::new(model_id, history, system_prompt, params);

        tokio::spawn(async move {
            let errors = tx.clone();
            let result = inner.run(guard, request, Some(tx), false).await;
            if let Err(e) = result {
                // The receiver may already be gone
                let _ = errors.send(Err(e)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Requests cooperative cancellation of the running generation
    pub fn stop(&self) {
        debug!("Generation stop requested");
        self.inner.session.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.session.running.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.session.is_cancelled()
    }

    /// Text published so far by the current or last generation
    pub fn output(&self) -> String {
        self.inner
            .session
            .output
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    pub fn last_stats(&self) -> Option<GenerationStats> {
        self.inner.session.stats.lock().ok().and_then(|s| *s)
    }
}

impl std::fmt::Debug for GenerationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationEngine")
            .field("sampling", &self.inner.sampling)
            .field("running", &self.is_running())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Request {
    model_id: String,
    history: PromptHistory,
    system_prompt: String,
    params: GenerationParams,
    abort: Option<Arc<AtomicBool>>,
}

impl Request {
    fn new(
        model_id: &str,
        history: &PromptHistory,
        system_prompt: &str,
        params: GenerationParams,
    ) -> Self {
        Self {
            model_id: model_id.to_string(),
            history: history.clone(),
            system_prompt: system_prompt.to_string(),
            params,
            abort: None,
        }
    }

    fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = Some(abort);
        self
    }
}

impl EngineInner {
    /// Runs one claimed generation; `guard` is released only after the session is final
    async fn run(
        self: Arc<Self>,
        guard: RunningGuard,
        request: Request,
        stream: Option<mpsc::Sender<Result<String, InferenceError>>>,
        explain_failure: bool,
    ) -> Result<Generation, InferenceError> {
        let result = Arc::clone(&self).execute(request, stream).await;
        if let Err(e) = &result {
            warn!(error = %e, "Generation failed");
            if explain_failure {
                self.session.set_output(e.user_message());
            }
        }
        drop(guard);
        result
    }

    async fn execute(
        self: Arc<Self>,
        request: Request,
        stream: Option<mpsc::Sender<Result<String, InferenceError>>>,
    ) -> Result<Generation, InferenceError> {
        let Request {
            model_id,
            history,
            system_prompt,
            params,
            abort,
        } = request;

        let handle = self.models.load(&model_id).await?;
        let prompt = self.formatter.format(&system_prompt, &history);
        let sampling = SamplingConfig {
            seed: wall_clock_seed(),
            ..self.sampling
        };

        let started = Instant::now();
        let session = Arc::clone(&self.session);
        let outcome = tokio::task::spawn_blocking(move || {
            let halt = Halt {
                session: &session,
                abort: abort.as_deref(),
            };
            decode(handle.as_ref(), &prompt, &sampling, params, &halt, stream.as_ref())
        })
        .await
        .map_err(|e| InferenceError::Runtime(format!("decode task failed: {}", e)))??;

        let stats = GenerationStats::new(outcome.tokens, started.elapsed(), outcome.halt);
        if let Ok(mut last) = self.session.stats.lock() {
            *last = Some(stats);
        }
        info!(
            model = %model_id,
            tokens = stats.tokens,
            halt = ?stats.halt,
            "Generation finished"
        );
        self.models.report(&ProgressEvent::GenerationFinished {
            model: model_id,
            tokens: stats.tokens,
            tokens_per_second: stats.tokens_per_second,
        });

        Ok(Generation {
            text: outcome.text,
            stats,
        })
    }
}

/// Cancellation sources checked by the token loop
struct Halt<'a> {
    session: &'a Session,
    abort: Option<&'a AtomicBool>,
}

impl Halt<'_> {
    fn requested(&self) -> bool {
        self.session.is_cancelled()
            || self.abort.is_some_and(|abort| abort.load(Ordering::SeqCst))
    }
}

fn stable_text(text: &str) -> &str {
    text.trim_end_matches('\u{FFFD}')
}

/// Token loop; runs on a blocking thread
fn decode(
    model: &dyn LoadedModel,
    prompt: &str,
    sampling: &SamplingConfig,
    params: GenerationParams,
    halt_on: &Halt<'_>,
    stream: Option<&mpsc::Sender<Result<String, InferenceError>>>,
) -> Result<DecodeOutcome, InferenceError> {
    let session = halt_on.session;
    let mut decoder = model.start_decode(prompt, sampling)?;
    let cadence = params.publish_cadence.max(1);
    let mut tokens: Vec<u32> = Vec::with_capacity(params.max_tokens.min(4096));
    let mut tracker = DeltaTracker::default();
    let mut published_at = 0;
    let mut halt = HaltReason::TokenBudget;

    while tokens.len() < params.max_tokens {
        if halt_on.requested() {
            halt = HaltReason::Cancelled;
            break;
        }

        match decoder.next_token()? {
            Some(token) => tokens.push(token),
            None => {
                halt = HaltReason::EndOfSequence;
                break;
            }
        }

        if tokens.len() % cadence == 0 {
            let text = decoder.detokenize(&tokens)?;
            published_at = tokens.len();
            if !publish_text(&text, session, stream, &mut tracker) {
                debug!("Stream receiver dropped, stopping");
                halt = HaltReason::Cancelled;
                break;
            }
            if halt_on.requested() {
                halt = HaltReason::Cancelled;
                break;
            }
        }
    }

    let full = decoder.detokenize(&tokens)?;
    if published_at != tokens.len() {
        publish_text(&full, session, stream, &mut tracker);
    }

    let text = match stream {
        Some(_) => tracker.published().to_string(),
        None => stable_text(&full).to_string(),
    };

    Ok(DecodeOutcome {
        text,
        tokens: tokens.len(),
        halt,
    })
}

/// Records the published text and forwards the new delta; `false` once the receiver is gone.
///
/// A streamed run stores exactly what was sent, so `output()` matches the joined deltas.
fn publish_text(
    text: &str,
    session: &Session,
    stream: Option<&mpsc::Sender<Result<String, InferenceError>>>,
    tracker: &mut DeltaTracker,
) -> bool {
    let Some(tx) = stream else {
        session.set_output(stable_text(text).to_string());
        return true;
    };

    let delta = tracker.advance(text);
    session.set_output(tracker.published().to_string());
    match delta {
        Some(delta) => tx.blocking_send(Ok(delta)).is_ok(),
        None => true,
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
