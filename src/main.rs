use pocketmind::cli::commands::{CliArgs, Commands};
use pocketmind::cli::handlers::{
    handle_chat, handle_config, handle_models, handle_offline, handle_summarize,
};
use pocketmind::util::logging::{self, LoggingConfig};
use pocketmind::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("pocketmind v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Chat(chat_args) => handle_chat(chat_args, args.quiet).await,
        Commands::Summarize(summarize_args) => handle_summarize(summarize_args, args.quiet).await,
        Commands::Models(models_args) => handle_models(models_args, args.quiet).await,
        Commands::Offline(offline_args) => handle_offline(offline_args),
        Commands::Config(config_args) => handle_config(config_args),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        logging::parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("POCKETMIND_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
        logging::parse_level(&level_str)
    };

    let use_json = env::var("POCKETMIND_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    logging::init_logging(LoggingConfig {
        use_json,
        ..LoggingConfig::with_level(level)
    });
}
