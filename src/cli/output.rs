//! Output formatting for multiple formats
//!
//! Results printed to stdout come out as JSON, YAML, or human-readable text.
//! Progress and diagnostics never go through here; they are written to stderr.
//!
//! # Example
//!
//! ```ignore
//! use pocketmind::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! let output = formatter.format_summary(&summary)?;
//! println!("{}", output);
//! ```

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::AssistantConfig;
use crate::document::DocumentSummary;
use crate::llm::ModelDescriptor;

fn rule() -> String {
    "\u{2501}".repeat(42)
}

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// One row of `models list`
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub id: String,
    pub display_name: String,
    pub size_mb: u64,
    pub ram_required_gb: f64,
    pub installed: bool,
    pub recommended: bool,
}

impl ModelStatus {
    pub fn new(descriptor: &ModelDescriptor, installed: bool, recommended: bool) -> Self {
        Self {
            id: descriptor.id.clone(),
            display_name: descriptor.display_name.clone(),
            size_mb: descriptor.size_mb,
            ram_required_gb: descriptor.ram_required_gb,
            installed,
            recommended,
        }
    }
}

#[derive(Serialize)]
struct OfflineStatus {
    offline_mode: bool,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a finished document summary
    pub fn format_summary(&self, summary: &DocumentSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary)
                .context("Failed to serialize summary to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(summary).context("Failed to serialize summary to YAML")
            }
            OutputFormat::Human => Ok(self.format_summary_human(summary)),
        }
    }

    /// Formats the model catalog with install status
    pub fn format_models(&self, models: &[ModelStatus]) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(models)
                .context("Failed to serialize model list to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(models).context("Failed to serialize model list to YAML")
            }
            OutputFormat::Human => Ok(self.format_models_human(models)),
        }
    }

    /// Formats configuration display
    pub fn format_config(&self, config: &AssistantConfig) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&config.to_display_map())
                .context("Failed to serialize config to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(&config.to_display_map())
                .context("Failed to serialize config to YAML"),
            OutputFormat::Human => Ok(config.to_string()),
        }
    }

    pub fn format_offline(&self, offline_mode: bool) -> Result<String> {
        let status = OfflineStatus { offline_mode };
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&status)
                .context("Failed to serialize offline status to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(&status)
                .context("Failed to serialize offline status to YAML"),
            OutputFormat::Human => Ok(format!(
                "Offline mode: {}\n",
                if offline_mode { "on" } else { "off" }
            )),
        }
    }

    fn format_summary_human(&self, summary: &DocumentSummary) -> String {
        let mut output = String::new();

        output.push_str(&format!("\u{2713} {}\n", summary.title));
        output.push_str(&rule());
        output.push_str("\n\n");
        output.push_str(summary.summary.trim());
        output.push_str("\n\n");

        let sections = summary.chunk_summaries.len();
        output.push_str(&format!(
            "Summarized {} section{}\n",
            sections,
            if sections == 1 { "" } else { "s" }
        ));
        output
    }

    fn format_models_human(&self, models: &[ModelStatus]) -> String {
        let mut output = String::new();

        output.push_str("Available Models\n");
        output.push_str(&rule());
        output.push_str("\n\n");

        for model in models {
            let symbol = if model.installed { "\u{2713}" } else { " " };
            let marker = if model.recommended {
                " (recommended)"
            } else {
                ""
            };
            output.push_str(&format!("{} {}{}\n", symbol, model.id, marker));
            output.push_str(&format!("  Name: {}\n", model.display_name));
            output.push_str(&format!(
                "  Size: {} MB, needs ~{:.1} GB RAM\n",
                model.size_mb, model.ram_required_gb
            ));
            output.push('\n');
        }

        output.push_str("\u{2713} = installed\n");
        output
    }
}
