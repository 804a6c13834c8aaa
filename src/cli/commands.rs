use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Private on-device assistant: chat and document summaries with local models
#[derive(Parser, Debug)]
#[command(
    name = "pocketmind",
    about = "Private on-device assistant: chat and document summaries with local models",
    version,
    author,
    long_about = "pocketmind runs quantized language models on this machine. Models are \
                  downloaded once from HuggingFace and served from the local cache afterwards; \
                  with offline mode on, the network is never touched."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Increase verbosity (can be used multiple times)"
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Ask the assistant a question",
        long_about = "Generates a reply with the selected local model, streaming it to stdout \
                      as it is decoded. Press Ctrl-C to stop early; the partial reply is kept.\n\n\
                      Examples:\n  \
                      pocketmind chat \"What is a B-tree?\"\n  \
                      echo \"Explain TCP slow start\" | pocketmind chat\n  \
                      pocketmind chat --model qwen2.5-0.5b-instruct --max-tokens 128 \"Hi\""
    )]
    Chat(ChatArgs),

    #[command(
        about = "Summarize a document",
        long_about = "Splits a text or markdown document into sections, summarizes each one \
                      and merges the results. Progress is reported on stderr; Ctrl-C cancels.\n\n\
                      Examples:\n  \
                      pocketmind summarize notes.md\n  \
                      pocketmind summarize report.txt --format json"
    )]
    Summarize(SummarizeArgs),

    #[command(
        about = "List or prepare models",
        long_about = "Shows the model catalog with install status, or acquires a model ahead \
                      of time so later runs start from the local cache.\n\n\
                      Examples:\n  \
                      pocketmind models list\n  \
                      pocketmind models load qwen2.5-0.5b-instruct"
    )]
    Models(ModelsArgs),

    #[command(
        about = "Show or change offline mode",
        long_about = "With offline mode on, models are only ever loaded from the local cache.\n\n\
                      Examples:\n  \
                      pocketmind offline on\n  \
                      pocketmind offline status"
    )]
    Offline(OfflineArgs),

    #[command(about = "Show the effective configuration")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ChatArgs {
    #[arg(
        value_name = "PROMPT",
        help = "Message to send (read from stdin when omitted)"
    )]
    pub prompt: Option<String>,

    #[arg(short = 's', long, value_name = "TEXT", help = "System prompt")]
    pub system: Option<String>,

    #[arg(
        short = 'm',
        long,
        value_name = "MODEL",
        help = "Model id from the catalog (defaults to the best fit for this machine)"
    )]
    pub model: Option<String>,

    #[arg(long, value_name = "N", help = "Maximum number of tokens to generate")]
    pub max_tokens: Option<usize>,

    #[arg(long, help = "Print the whole reply once it is complete")]
    pub no_stream: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct SummarizeArgs {
    #[arg(value_name = "FILE", help = "Document to summarize (.txt or .md)")]
    pub file: PathBuf,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model id from the catalog")]
    pub model: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ModelsCommand {
    #[command(about = "List catalog models and whether they are installed")]
    List {
        #[arg(
            short = 'f',
            long,
            value_enum,
            default_value = "human",
            help = "Output format"
        )]
        format: OutputFormatArg,
    },

    #[command(about = "Download (if needed) and load a model")]
    Load {
        #[arg(value_name = "MODEL", help = "Model id from the catalog")]
        model: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct OfflineArgs {
    #[arg(value_enum, default_value = "status")]
    pub action: OfflineAction,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineAction {
    On,
    Off,
    Status,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
