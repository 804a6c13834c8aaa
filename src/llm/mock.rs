//! Scripted runtime for tests and offline demos
//!
//! [`MockRuntime`] hands out [`MockModel`]s whose decode sessions replay a fixed list of
//! text pieces. Token id `i` renders as `pieces[i]`, so detokenizing is concatenation.

use super::catalog::ModelDescriptor;
use super::error::InferenceError;
use super::runtime::{DecodeSession, InferenceRuntime, LoadedModel, ModelHandle, ProgressCallback};
use super::types::SamplingConfig;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a mock decode session produces
#[derive(Debug, Clone)]
pub struct MockScript {
    pieces: Vec<String>,
    end_of_sequence: bool,
    token_delay: Duration,
    fail_at: Option<usize>,
}

impl MockScript {
    /// Emits `pieces` in order, then signals end of sequence
    pub fn new(pieces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            pieces: pieces.into_iter().map(Into::into).collect(),
            end_of_sequence: true,
            token_delay: Duration::ZERO,
            fail_at: None,
        }
    }

    /// Cycles through `pieces` forever; only the token budget or a stop ends decoding
    pub fn endless(pieces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            end_of_sequence: false,
            ..Self::new(pieces)
        }
    }

    /// Sleeps before every token
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Fails when asked for token number `index` (zero-based)
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl Default for MockScript {
    fn default() -> Self {
        Self::new(["Hello", ",", " world", "!"])
    }
}

#[derive(Debug, Default)]
struct MockLog {
    prompts: Mutex<Vec<String>>,
    seeds: Mutex<Vec<u64>>,
}

pub struct MockRuntime {
    local_models: Mutex<HashSet<String>>,
    download_error: Mutex<Option<InferenceError>>,
    script: Mutex<MockScript>,
    log: Arc<MockLog>,
    local_attempts: AtomicUsize,
    network_attempts: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            local_models: Mutex::new(HashSet::new()),
            download_error: Mutex::new(None),
            script: Mutex::new(MockScript::default()),
            log: Arc::new(MockLog::default()),
            local_attempts: AtomicUsize::new(0),
            network_attempts: AtomicUsize::new(0),
        }
    }

    /// Marks `model_id` as present in the local cache
    pub fn with_local_model(self, model_id: &str) -> Self {
        self.local_models.lock().unwrap().insert(model_id.to_string());
        self
    }

    pub fn with_script(self, script: MockScript) -> Self {
        self.set_script(script);
        self
    }

    /// Every download attempt fails with `error`
    pub fn fail_downloads_with(self, error: InferenceError) -> Self {
        *self.download_error.lock().unwrap() = Some(error);
        self
    }

    /// Script used by models acquired from now on
    pub fn set_script(&self, script: MockScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn set_download_error(&self, error: Option<InferenceError>) {
        *self.download_error.lock().unwrap() = error;
    }

    /// Removes `model_id` from the local cache
    pub fn evict_local(&self, model_id: &str) {
        self.local_models.lock().unwrap().remove(model_id);
    }

    pub fn local_attempts(&self) -> usize {
        self.local_attempts.load(Ordering::SeqCst)
    }

    pub fn network_attempts(&self) -> usize {
        self.network_attempts.load(Ordering::SeqCst)
    }

    /// Prompts of every decode session started so far
    pub fn prompts(&self) -> Vec<String> {
        self.log.prompts.lock().unwrap().clone()
    }

    /// Sampler seeds of every decode session started so far
    pub fn seeds(&self) -> Vec<u64> {
        self.log.seeds.lock().unwrap().clone()
    }

    fn model(&self, descriptor: &ModelDescriptor) -> ModelHandle {
        Arc::new(MockModel {
            descriptor: descriptor.clone(),
            script: self.script.lock().unwrap().clone(),
            log: Arc::clone(&self.log),
        })
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceRuntime for MockRuntime {
    async fn acquire_local(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<ModelHandle, InferenceError> {
        self.local_attempts.fetch_add(1, Ordering::SeqCst);

        if self.local_models.lock().unwrap().contains(&descriptor.id) {
            Ok(self.model(descriptor))
        } else {
            Err(InferenceError::ModelAssetMissing {
                model: descriptor.id.clone(),
                message: "not in local cache".to_string(),
            })
        }
    }

    async fn acquire_with_download(
        &self,
        descriptor: &ModelDescriptor,
        on_progress: ProgressCallback,
    ) -> Result<ModelHandle, InferenceError> {
        self.network_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.download_error.lock().unwrap().clone() {
            return Err(error);
        }

        for fraction in [0.0, 0.5, 1.0] {
            on_progress(fraction);
        }
        self.local_models
            .lock()
            .unwrap()
            .insert(descriptor.id.clone());
        Ok(self.model(descriptor))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRuntime")
            .field("local_attempts", &self.local_attempts())
            .field("network_attempts", &self.network_attempts())
            .finish()
    }
}

pub struct MockModel {
    descriptor: ModelDescriptor,
    script: MockScript,
    log: Arc<MockLog>,
}

impl LoadedModel for MockModel {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn start_decode<'a>(
        &'a self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<Box<dyn DecodeSession + 'a>, InferenceError> {
        self.log.prompts.lock().unwrap().push(prompt.to_string());
        self.log.seeds.lock().unwrap().push(sampling.seed);

        Ok(Box::new(MockDecodeSession {
            script: &self.script,
            produced: 0,
        }))
    }
}

struct MockDecodeSession<'a> {
    script: &'a MockScript,
    produced: usize,
}

impl DecodeSession for MockDecodeSession<'_> {
    fn next_token(&mut self) -> Result<Option<u32>, InferenceError> {
        if self.script.fail_at == Some(self.produced) {
            return Err(InferenceError::Runtime("mock decode failure".to_string()));
        }
        if self.script.pieces.is_empty()
            || (self.script.end_of_sequence && self.produced >= self.script.pieces.len())
        {
            return Ok(None);
        }
        if !self.script.token_delay.is_zero() {
            std::thread::sleep(self.script.token_delay);
        }

        let id = self.produced % self.script.pieces.len();
        self.produced += 1;
        Ok(Some(id as u32))
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String, InferenceError> {
        tokens
            .iter()
            .map(|&t| {
                self.script
                    .pieces
                    .get(t as usize)
                    .map(String::as_str)
                    .ok_or_else(|| InferenceError::Runtime(format!("unknown token {}", t)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::catalog::ModelCatalog;

    fn descriptor() -> ModelDescriptor {
        ModelCatalog::builtin().models()[0].clone()
    }

    #[tokio::test]
    async fn test_local_miss_then_download() {
        let runtime = MockRuntime::new();
        let d = descriptor();

        assert!(runtime.acquire_local(&d).await.is_err());
        runtime
            .acquire_with_download(&d, Box::new(|_| {}))
            .await
            .unwrap();
        assert!(runtime.acquire_local(&d).await.is_ok());

        assert_eq!(runtime.local_attempts(), 2);
        assert_eq!(runtime.network_attempts(), 1);
    }

    #[tokio::test]
    async fn test_scripted_decode() {
        let runtime = MockRuntime::new().with_script(MockScript::new(["a", "b", "c"]));
        let model = runtime
            .acquire_with_download(&descriptor(), Box::new(|_| {}))
            .await
            .unwrap();

        let mut session = model
            .start_decode("prompt", &SamplingConfig::default())
            .unwrap();
        let mut tokens = Vec::new();
        while let Some(t) = session.next_token().unwrap() {
            tokens.push(t);
        }

        assert_eq!(session.detokenize(&tokens).unwrap(), "abc");
        assert_eq!(runtime.prompts(), vec!["prompt".to_string()]);
    }

    #[test]
    fn test_endless_script_cycles() {
        let model = MockModel {
            descriptor: descriptor(),
            script: MockScript::endless(["x", "y"]),
            log: Arc::default(),
        };
        let mut session = model
            .start_decode("", &SamplingConfig::default())
            .unwrap();
        let tokens: Vec<u32> = (0..5).map(|_| session.next_token().unwrap().unwrap()).collect();
        assert_eq!(session.detokenize(&tokens).unwrap(), "xyxyx");
    }

    #[test]
    fn test_failure_injection() {
        let model = MockModel {
            descriptor: descriptor(),
            script: MockScript::new(["x", "y"]).failing_at(1),
            log: Arc::default(),
        };
        let mut session = model
            .start_decode("", &SamplingConfig::default())
            .unwrap();
        assert!(session.next_token().is_ok());
        assert!(session.next_token().is_err());
    }
}
