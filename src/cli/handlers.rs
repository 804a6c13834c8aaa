//! Command handlers for the `pocketmind` binary
//!
//! Each handler returns the process exit code. Results go to stdout; progress, errors
//! and logs go to stderr.

use super::commands::{
    ChatArgs, ConfigArgs, ModelsArgs, ModelsCommand, OfflineAction, OfflineArgs, SummarizeArgs,
};
use super::output::{ModelStatus, OutputFormat, OutputFormatter};
use crate::config::AssistantConfig;
use crate::document::{SummarizationPipeline, SummaryOutcome};
use crate::llm::{
    CandleRuntime, GenerationEngine, HardwareDetector, InferenceError, ModelLifecycleManager,
    PromptHistory,
};
use crate::progress::{LoggingHandler, ProgressEvent, ProgressHandler};
use crate::settings::{installed_key, JsonFileSettings, SettingsStore, OFFLINE_MODE_KEY};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Read, Write};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Exit code for a run interrupted with Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

/// Logs every event and draws model downloads as a progress bar
struct ConsoleProgress {
    quiet: bool,
    download: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            download: Mutex::new(None),
        }
    }

    fn download_bar(model: &str) -> ProgressBar {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{msg} [{bar:30}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("=> "));
        bar.set_message(format!("Downloading {}", model));
        bar
    }
}

impl ProgressHandler for ConsoleProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        LoggingHandler.on_progress(event);
        if self.quiet {
            return;
        }
        let Ok(mut download) = self.download.lock() else {
            return;
        };

        match event {
            ProgressEvent::Downloading { model, fraction } => {
                let bar = download.get_or_insert_with(|| Self::download_bar(model));
                bar.set_position((fraction.clamp(0.0, 1.0) * 100.0) as u64);
            }
            ProgressEvent::ModelReady { model, source, .. } => {
                if let Some(bar) = download.take() {
                    bar.finish_and_clear();
                }
                eprintln!("{} ready ({})", model, source);
            }
            ProgressEvent::ModelLoadFailed { .. } => {
                if let Some(bar) = download.take() {
                    bar.abandon();
                }
            }
            _ => {}
        }
    }
}

/// Runtime, lifecycle manager and engine for one command
struct Assistant {
    config: AssistantConfig,
    engine: GenerationEngine,
    model_id: String,
}

impl Assistant {
    fn build(
        mut config: AssistantConfig,
        model: Option<&str>,
        quiet: bool,
    ) -> anyhow::Result<Self> {
        if let Some(model) = model {
            config.model = Some(model.to_string());
        }
        config.validate()?;

        let catalog = config.load_catalog()?;
        let runtime = CandleRuntime::new(config.model_dir.clone());
        let model_id = config.resolve_model(&catalog, runtime.capabilities())?;
        debug!(
            model = %model_id,
            cache = %runtime.store().cache_dir().display(),
            "Assistant configured"
        );

        let settings = Arc::new(JsonFileSettings::open(config.settings_path.clone()));
        let manager = ModelLifecycleManager::new(Arc::new(runtime), settings, catalog)
            .with_progress_handler(Arc::new(ConsoleProgress::new(quiet)));
        let engine = GenerationEngine::new(Arc::new(manager), config.sampling());

        Ok(Self {
            config,
            engine,
            model_id,
        })
    }

    fn manager(&self) -> &Arc<ModelLifecycleManager> {
        self.engine.models()
    }
}

fn report_failure(context: &str, e: &anyhow::Error) {
    error!("{}: {:#}", context, e);
    match e.downcast_ref::<InferenceError>() {
        Some(inference) => eprintln!("Error: {}", inference.user_message()),
        None => eprintln!("Error: {:#}", e),
    }
}

fn read_prompt(args: &ChatArgs) -> anyhow::Result<String> {
    if let Some(prompt) = &args.prompt {
        return Ok(prompt.clone());
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        anyhow::bail!("No prompt given. Pass it as an argument or pipe it on stdin");
    }
    let mut prompt = String::new();
    stdin.lock().read_to_string(&mut prompt)?;
    Ok(prompt)
}

pub async fn handle_chat(args: &ChatArgs, quiet: bool) -> i32 {
    match run_chat(args, quiet).await {
        Ok(code) => code,
        Err(e) => {
            report_failure("Chat failed", &e);
            1
        }
    }
}

async fn run_chat(args: &ChatArgs, quiet: bool) -> anyhow::Result<i32> {
    let prompt = read_prompt(args)?;
    if prompt.trim().is_empty() {
        anyhow::bail!("Prompt is empty");
    }

    let mut config = AssistantConfig::default();
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }
    let assistant = Assistant::build(config, args.model.as_deref(), quiet)?;

    let history = PromptHistory::single_user(prompt.trim());
    let system_prompt = args.system.as_deref().unwrap_or_default();
    let params = assistant.config.generation_params();
    let engine = &assistant.engine;

    // Cancellation is cooperative: Ctrl-C only flags the engine
    let stopper = engine.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping generation");
            stopper.stop();
        }
    });

    let mut stdout = io::stdout();
    let mut failure = None;

    if args.no_stream {
        let reply = engine
            .try_generate(&assistant.model_id, &history, system_prompt, params)
            .await;
        match reply {
            Ok(generation) => writeln!(stdout, "{}", generation.text)?,
            Err(e) => failure = Some(e),
        }
    } else {
        let mut stream =
            engine.generate_stream(&assistant.model_id, &history, system_prompt, params);
        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    write!(stdout, "{}", delta)?;
                    stdout.flush()?;
                }
                Err(e) => failure = Some(e),
            }
        }
        writeln!(stdout)?;
    }
    ctrl_c.abort();

    if let Some(e) = failure {
        return Err(e.into());
    }

    if !quiet {
        if let Some(stats) = engine.last_stats() {
            eprintln!(
                "[{} tokens, {:.1} tok/s, {:?}]",
                stats.tokens, stats.tokens_per_second, stats.halt
            );
        }
    }

    Ok(if engine.is_cancelled() { EXIT_INTERRUPTED } else { 0 })
}

pub async fn handle_summarize(args: &SummarizeArgs, quiet: bool) -> i32 {
    match run_summarize(args, quiet).await {
        Ok(code) => code,
        Err(e) => {
            report_failure("Summarization failed", &e);
            1
        }
    }
}

async fn run_summarize(args: &SummarizeArgs, quiet: bool) -> anyhow::Result<i32> {
    if !args.file.is_file() {
        anyhow::bail!("Document does not exist: {}", args.file.display());
    }

    let assistant = Assistant::build(AssistantConfig::default(), args.model.as_deref(), quiet)?;
    let summarization = assistant.config.summarization(&assistant.model_id);
    let pipeline = Arc::new(
        SummarizationPipeline::new(assistant.engine.clone(), summarization)
            .with_progress_handler(Arc::new(LoggingHandler)),
    );

    let canceller = Arc::clone(&pipeline);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling summarization");
            canceller.cancel_processing();
        }
    });

    let reporter = (!quiet).then(|| {
        let mut snapshots = pipeline.subscribe();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                eprintln!("[{:>3.0}%] {}", snapshot.progress * 100.0, snapshot.state);
            }
        })
    });

    let outcome = pipeline.process_document(&args.file).await;
    ctrl_c.abort();
    if let Some(reporter) = reporter {
        reporter.abort();
    }

    match outcome? {
        SummaryOutcome::Completed(summary) => {
            let formatter = OutputFormatter::new(args.format.into());
            print!("{}", formatter.format_summary(&summary)?);
            Ok(0)
        }
        SummaryOutcome::Cancelled => {
            eprintln!("Summarization cancelled");
            Ok(EXIT_INTERRUPTED)
        }
    }
}

pub async fn handle_models(args: &ModelsArgs, quiet: bool) -> i32 {
    let result = match &args.command {
        ModelsCommand::List { format } => list_models((*format).into()),
        ModelsCommand::Load { model } => load_model(model, quiet).await,
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            report_failure("Model command failed", &e);
            1
        }
    }
}

fn list_models(format: OutputFormat) -> anyhow::Result<()> {
    let config = AssistantConfig::default();
    let catalog = config.load_catalog()?;
    let settings = JsonFileSettings::open(config.settings_path.clone());
    let capabilities = HardwareDetector::detect();
    let recommended = catalog.recommended(&capabilities).map(|d| d.id.clone());

    let rows: Vec<ModelStatus> = catalog
        .models()
        .iter()
        .map(|d| {
            let installed = settings.get_bool(&installed_key(&d.id));
            ModelStatus::new(d, installed, recommended.as_deref() == Some(d.id.as_str()))
        })
        .collect();

    print!("{}", OutputFormatter::new(format).format_models(&rows)?);
    Ok(())
}

async fn load_model(model: &str, quiet: bool) -> anyhow::Result<()> {
    let assistant = Assistant::build(AssistantConfig::default(), Some(model), quiet)?;
    assistant.manager().load(&assistant.model_id).await?;
    if !quiet {
        println!("{}: {}", assistant.model_id, assistant.manager().status());
    }
    Ok(())
}

pub fn handle_offline(args: &OfflineArgs) -> i32 {
    let config = AssistantConfig::default();
    let settings = JsonFileSettings::open(config.settings_path.clone());

    let update = match args.action {
        OfflineAction::On => Some(true),
        OfflineAction::Off => Some(false),
        OfflineAction::Status => None,
    };

    if let Some(offline) = update {
        if let Err(e) = settings.set_bool(OFFLINE_MODE_KEY, offline) {
            error!("Failed to update offline mode: {}", e);
            return 1;
        }
        info!(offline, "Offline mode updated");
    }

    let formatter = OutputFormatter::new(OutputFormat::Human);
    match formatter.format_offline(settings.get_bool(OFFLINE_MODE_KEY)) {
        Ok(output) => {
            print!("{}", output);
            0
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

pub fn handle_config(args: &ConfigArgs) -> i32 {
    let config = AssistantConfig::default();
    if let Err(e) = config.validate() {
        eprintln!("Warning: {}", e);
    }

    match OutputFormatter::new(args.format.into()).format_config(&config) {
        Ok(output) => {
            print!("{}", output);
            0
        }
        Err(e) => {
            error!("Failed to format configuration: {:#}", e);
            1
        }
    }
}
