pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{
    ChatArgs, CliArgs, Commands, ConfigArgs, ModelsArgs, ModelsCommand, OfflineAction,
    OfflineArgs, SummarizeArgs,
};
pub use output::{ModelStatus, OutputFormat, OutputFormatter};
