//! Integration tests for the generation engine
//!
//! The scripted runtime makes token output deterministic: token `i` renders as the
//! i-th piece of the script.

use async_trait::async_trait;
use futures_util::StreamExt;
use pocketmind::llm::{
    DecodeSession, GenerationEngine, GenerationParams, HaltReason, InferenceError,
    InferenceRuntime, LoadedModel, MockRuntime, MockScript, ModelCatalog, ModelDescriptor,
    ModelHandle, ModelLifecycleManager, ProgressCallback, PromptHistory, SamplingConfig,
};
use pocketmind::settings::{installed_key, MemorySettings};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

const MODEL: &str = "qwen2.5-0.5b-instruct";

fn engine_with(script: MockScript) -> (GenerationEngine, Arc<MockRuntime>) {
    let runtime = Arc::new(MockRuntime::new().with_local_model(MODEL).with_script(script));
    let settings = MemorySettings::with_values([(installed_key(MODEL).as_str(), true)]);
    let manager =
        ModelLifecycleManager::new(runtime.clone(), Arc::new(settings), ModelCatalog::builtin());
    let engine = GenerationEngine::new(Arc::new(manager), SamplingConfig::default());
    (engine, runtime)
}

/// Model whose decode of later tokens rewrites text it already produced
struct RewritingModel {
    descriptor: ModelDescriptor,
    renders: Vec<&'static str>,
}

struct RewritingSession<'a> {
    renders: &'a [&'static str],
    produced: usize,
}

impl LoadedModel for RewritingModel {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn start_decode<'a>(
        &'a self,
        _prompt: &str,
        _sampling: &SamplingConfig,
    ) -> Result<Box<dyn DecodeSession + 'a>, InferenceError> {
        Ok(Box::new(RewritingSession {
            renders: &self.renders,
            produced: 0,
        }))
    }
}

impl DecodeSession for RewritingSession<'_> {
    fn next_token(&mut self) -> Result<Option<u32>, InferenceError> {
        if self.produced == self.renders.len() {
            return Ok(None);
        }
        self.produced += 1;
        Ok(Some(self.produced as u32))
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String, InferenceError> {
        Ok(match tokens.len() {
            0 => String::new(),
            n => self.renders[n - 1].to_string(),
        })
    }
}

struct RewritingRuntime {
    renders: Vec<&'static str>,
}

#[async_trait]
impl InferenceRuntime for RewritingRuntime {
    async fn acquire_local(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<ModelHandle, InferenceError> {
        Ok(Arc::new(RewritingModel {
            descriptor: descriptor.clone(),
            renders: self.renders.clone(),
        }))
    }

    async fn acquire_with_download(
        &self,
        descriptor: &ModelDescriptor,
        _on_progress: ProgressCallback,
    ) -> Result<ModelHandle, InferenceError> {
        self.acquire_local(descriptor).await
    }

    fn name(&self) -> &str {
        "rewriting"
    }
}

fn ask(text: &str) -> PromptHistory {
    PromptHistory::single_user(text)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_generate_returns_full_reply() {
    let (engine, runtime) = engine_with(MockScript::default());

    let reply = engine
        .generate(MODEL, &ask("Hi"), "Be friendly", GenerationParams::default())
        .await;

    assert_eq!(reply, "Hello, world!");
    assert_eq!(engine.output(), "Hello, world!");
    assert!(!engine.is_running());

    let stats = engine.last_stats().unwrap();
    assert_eq!(stats.tokens, 4);
    assert_eq!(stats.halt, HaltReason::EndOfSequence);

    let prompts = runtime.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Be friendly"));
    assert!(prompts[0].contains("Hi"));
    assert!(prompts[0].ends_with("<|im_start|>assistant\n"));
}

#[tokio::test]
async fn test_token_budget_halts_generation() {
    let (engine, _) = engine_with(MockScript::endless(["a"]));

    let generation = engine
        .try_generate(MODEL, &ask("go"), "", GenerationParams::new(5))
        .await
        .unwrap();

    assert_eq!(generation.text, "aaaaa");
    assert_eq!(generation.stats.tokens, 5);
    assert_eq!(generation.stats.halt, HaltReason::TokenBudget);
}

#[tokio::test]
async fn test_stream_deltas_concatenate_to_output() {
    let script = MockScript::new(["The", " quick", " brown", " fox", " jumps"]);
    let (engine, _) = engine_with(script);
    let params = GenerationParams::new(64).with_publish_cadence(2);

    let deltas: Vec<String> = engine
        .generate_stream(MODEL, &ask("story"), "", params)
        .map(|item| item.unwrap())
        .collect()
        .await;

    // Published after tokens 2 and 4, then the final flush
    assert_eq!(deltas, vec!["The quick", " brown fox", " jumps"]);
    assert_eq!(deltas.concat(), engine.output());
    assert_eq!(engine.output(), "The quick brown fox jumps");
}

#[tokio::test]
async fn test_stream_stays_consistent_when_decode_rewrites_text() {
    let runtime = Arc::new(RewritingRuntime {
        renders: vec!["Hello ", "Hello, world", "Hello, world and more text"],
    });
    let settings = MemorySettings::with_values([(installed_key(MODEL).as_str(), true)]);
    let manager = ModelLifecycleManager::new(runtime, Arc::new(settings), ModelCatalog::builtin());
    let engine = GenerationEngine::new(Arc::new(manager), SamplingConfig::default());
    let params = GenerationParams::new(64).with_publish_cadence(1);

    let deltas: Vec<String> = engine
        .generate_stream(MODEL, &ask("hi"), "", params)
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(deltas.len(), 3);
    assert_eq!(deltas.concat(), engine.output());
    assert!(engine.output().ends_with(" world and more text"));
}

#[tokio::test]
async fn test_budget_cut_inside_multibyte_char_is_dropped() {
    let script = MockScript::endless(["ab", "\u{FFFD}"]);

    let (engine, _) = engine_with(script.clone());
    let generation = engine
        .try_generate(MODEL, &ask("hi"), "", GenerationParams::new(2))
        .await
        .unwrap();
    assert_eq!(generation.text, "ab");
    assert_eq!(engine.output(), "ab");

    let (engine, _) = engine_with(script);
    let deltas: Vec<String> = engine
        .generate_stream(MODEL, &ask("hi"), "", GenerationParams::new(2))
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(deltas, vec!["ab"]);
    assert_eq!(engine.output(), "ab");
}

#[tokio::test]
async fn test_abort_raised_before_start_halts_generation() {
    let (engine, runtime) = engine_with(MockScript::endless(["a"]));
    let abort = Arc::new(AtomicBool::new(true));

    let generation = engine
        .try_generate_with_abort(MODEL, &ask("hi"), "", GenerationParams::new(50), abort)
        .await
        .unwrap();

    assert_eq!(generation.stats.halt, HaltReason::Cancelled);
    assert_eq!(generation.stats.tokens, 0);
    assert_eq!(generation.text, "");
    assert_eq!(runtime.prompts().len(), 1);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_stream_ends_with_error_item() {
    let (engine, _) = engine_with(MockScript::default().failing_at(2));
    let params = GenerationParams::new(64).with_publish_cadence(1);

    let items: Vec<_> = engine
        .generate_stream(MODEL, &ask("hi"), "", params)
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_deref(), Ok("Hello"));
    assert_eq!(items[1].as_deref(), Ok(","));
    assert!(matches!(items[2], Err(InferenceError::Runtime(_))));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_unknown_model_reply_explains_failure() {
    let (engine, _) = engine_with(MockScript::default());

    let reply = engine
        .generate("no-such-model", &ask("hi"), "", GenerationParams::default())
        .await;

    assert_eq!(
        reply,
        InferenceError::ModelNotFound("no-such-model".to_string()).user_message()
    );
    assert_eq!(engine.output(), reply);
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_request_dropped_while_running() {
    let script = MockScript::endless(["x"]).with_token_delay(Duration::from_millis(10));
    let (engine, runtime) = engine_with(script);
    let params = GenerationParams::new(40).with_publish_cadence(1);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.generate(MODEL, &ask("one"), "", params).await })
    };
    wait_until(|| engine.is_running()).await;

    let second = engine.generate(MODEL, &ask("two"), "", params).await;
    assert_eq!(second, "");

    let busy = engine.try_generate(MODEL, &ask("three"), "", params).await;
    assert_eq!(busy.err(), Some(InferenceError::EngineBusy));

    let reply = first.await.unwrap();
    assert_eq!(reply, "x".repeat(40));
    assert_eq!(runtime.prompts().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_keeps_partial_output() {
    let script = MockScript::endless(["tok "]).with_token_delay(Duration::from_millis(5));
    let (engine, _) = engine_with(script);
    let params = GenerationParams::new(10_000).with_publish_cadence(1);

    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.try_generate(MODEL, &ask("long"), "", params).await })
    };
    wait_until(|| !engine.output().is_empty()).await;

    engine.stop();
    let generation = run.await.unwrap().unwrap();

    assert!(!engine.is_running());
    assert!(engine.is_cancelled());
    assert_eq!(generation.stats.halt, HaltReason::Cancelled);
    assert!(generation.stats.tokens > 0);
    assert!(generation.stats.tokens < 10_000);
    assert_eq!(engine.output(), generation.text);
}

#[tokio::test]
async fn test_stop_before_start_does_not_cancel_next_run() {
    let (engine, _) = engine_with(MockScript::default());

    engine.stop();
    let reply = engine
        .generate(MODEL, &ask("hi"), "", GenerationParams::default())
        .await;

    assert_eq!(reply, "Hello, world!");
    assert!(!engine.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_stream_stops_decoding() {
    let script = MockScript::endless(["z"]).with_token_delay(Duration::from_millis(2));
    let (engine, _) = engine_with(script);
    let params = GenerationParams::new(100_000).with_publish_cadence(1);

    let mut stream = engine.generate_stream(MODEL, &ask("hi"), "", params);
    assert_eq!(stream.next().await.unwrap().unwrap(), "z");
    drop(stream);

    wait_until(|| !engine.is_running()).await;
    assert!(!engine.is_cancelled());
    let stats = engine.last_stats().unwrap();
    assert_eq!(stats.halt, HaltReason::Cancelled);
    assert!(stats.tokens < 100_000);
}

#[tokio::test]
async fn test_each_generation_gets_fresh_seed() {
    let (engine, runtime) = engine_with(MockScript::default());

    for _ in 0..2 {
        engine
            .generate(MODEL, &ask("hi"), "", GenerationParams::default())
            .await;
    }

    let seeds = runtime.seeds();
    assert_eq!(seeds.len(), 2);
    assert_ne!(seeds[0], seeds[1]);
}
