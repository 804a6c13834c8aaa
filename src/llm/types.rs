//! Conversation and generation types
//!
//! This module defines the types passed into the generation engine, independent of any
//! specific inference runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions
    System,
    /// User message
    User,
    /// Assistant (model) response
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Text content of the message
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Ordered conversation history handed to a single generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptHistory(Vec<ChatMessage>);

impl PromptHistory {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self(messages)
    }

    /// History holding a single user turn
    pub fn single_user(content: impl Into<String>) -> Self {
        Self(vec![ChatMessage::user(content)])
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new history with `message` appended
    pub fn with(&self, message: ChatMessage) -> Self {
        let mut messages = self.0.clone();
        messages.push(message);
        Self(messages)
    }
}

impl From<Vec<ChatMessage>> for PromptHistory {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self(messages)
    }
}

/// Per-call generation limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Hard budget of tokens to decode
    pub max_tokens: usize,
    /// Publish decoded text every N tokens
    pub publish_cadence: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            publish_cadence: 4,
        }
    }
}

impl GenerationParams {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }

    /// Sets the publish cadence (clamped to at least one token)
    pub fn with_publish_cadence(mut self, cadence: usize) -> Self {
        self.publish_cadence = cadence.max(1);
        self
    }
}

/// Sampling settings fixed for the lifetime of an engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub top_p: Option<f64>,
    /// Seed for the sampler; the engine overwrites this on every call
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: Some(0.9),
            seed: 42,
        }
    }
}

impl SamplingConfig {
    pub fn with_temperature(temperature: f64) -> Self {
        Self {
            temperature,
            ..Default::default()
        }
    }
}

/// Why a generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// `max_tokens` was reached
    TokenBudget,
    /// The model emitted an end-of-sequence token
    EndOfSequence,
    /// `stop()` was observed at a checkpoint
    Cancelled,
}

/// Statistics recorded when a generation finishes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub tokens: usize,
    pub elapsed: Duration,
    pub tokens_per_second: f64,
    pub halt: HaltReason,
}

impl GenerationStats {
    pub fn new(tokens: usize, elapsed: Duration, halt: HaltReason) -> Self {
        let secs = elapsed.as_secs_f64();
        let tokens_per_second = if secs > 0.0 {
            tokens as f64 / secs
        } else {
            0.0
        };
        Self {
            tokens,
            elapsed,
            tokens_per_second,
            halt,
        }
    }
}

/// Result of a completed batch generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub stats: GenerationStats,
}
