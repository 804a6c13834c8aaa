//! Inference error types
//!
//! Every failure that can leave the model lifecycle manager or the generation engine is
//! expressed as an [`InferenceError`]. Low-level runtime errors (hf-hub, candle, tokenizers,
//! io) are classified into these variants by [`InferenceError::classify`] so callers never
//! see a raw runtime error.

use std::io;
use thiserror::Error;

/// Errors produced while acquiring a model or generating text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// The requested model id is not in the catalog
    #[error("model '{0}' is not in the catalog")]
    ModelNotFound(String),

    /// Offline mode is on and no local copy of the model exists
    #[error("model '{0}' is not available offline")]
    ModelUnavailableOffline(String),

    /// The network request timed out
    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    /// The device has no network connectivity
    #[error("network offline: {0}")]
    NetworkOffline(String),

    /// The connection dropped mid-transfer
    #[error("network connection lost: {0}")]
    NetworkConnectionLost(String),

    /// The model host could not be reached
    #[error("host unreachable: {0}")]
    NetworkHostUnreachable(String),

    /// Any other network failure
    #[error("network error: {0}")]
    GenericNetwork(String),

    /// Model weights or tokenizer are missing from local storage
    #[error("model asset missing for '{model}': {message}")]
    ModelAssetMissing { model: String, message: String },

    /// Another generation is already running on this engine
    #[error("a generation is already in progress")]
    EngineBusy,

    /// Error raised by the inference runtime itself
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Coarse grouping used to pick a user-facing explanation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    MissingAsset,
    Generic,
}

impl InferenceError {
    /// Classifies an arbitrary runtime error.
    ///
    /// Walks the error chain looking for an [`io::Error`] first, since hf-hub and the
    /// HTTP stack surface socket failures that way, then falls back to matching the
    /// rendered message.
    pub fn classify(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                if let Some(classified) = Self::from_io_kind(io_err.kind(), &format!("{:#}", error)) {
                    return classified;
                }
            }
            if let Some(existing) = cause.downcast_ref::<InferenceError>() {
                return existing.clone();
            }
        }
        Self::classify_message(&format!("{:#}", error))
    }

    fn from_io_kind(kind: io::ErrorKind, message: &str) -> Option<Self> {
        let message = message.to_string();
        match kind {
            io::ErrorKind::TimedOut => Some(Self::NetworkTimeout(message)),
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Some(Self::NetworkConnectionLost(message)),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable => {
                Some(Self::NetworkHostUnreachable(message))
            }
            io::ErrorKind::NotConnected => Some(Self::NetworkOffline(message)),
            _ => None,
        }
    }

    /// Classifies an error from its rendered message alone
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let owned = message.to_string();

        if lower.contains("timed out") || lower.contains("timeout") {
            Self::NetworkTimeout(owned)
        } else if lower.contains("network is unreachable")
            || lower.contains("no network")
            || lower.contains("not connected")
            || lower.contains("offline")
        {
            Self::NetworkOffline(owned)
        } else if lower.contains("connection reset")
            || lower.contains("connection closed")
            || lower.contains("connection aborted")
            || lower.contains("broken pipe")
        {
            Self::NetworkConnectionLost(owned)
        } else if lower.contains("dns")
            || lower.contains("failed to lookup address")
            || lower.contains("host unreachable")
            || lower.contains("no route to host")
            || lower.contains("connection refused")
        {
            Self::NetworkHostUnreachable(owned)
        } else if lower.contains("http")
            || lower.contains("request error")
            || lower.contains("status code")
            || lower.contains("transport")
        {
            Self::GenericNetwork(owned)
        } else if lower.contains("no such file")
            || lower.contains("not found")
            || lower.contains("missing")
        {
            Self::ModelAssetMissing {
                model: String::new(),
                message: owned,
            }
        } else {
            Self::Runtime(owned)
        }
    }

    /// Returns the coarse category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NetworkTimeout(_)
            | Self::NetworkOffline(_)
            | Self::NetworkConnectionLost(_)
            | Self::NetworkHostUnreachable(_)
            | Self::GenericNetwork(_)
            | Self::ModelUnavailableOffline(_) => ErrorCategory::Network,
            Self::ModelAssetMissing { .. } | Self::ModelNotFound(_) => ErrorCategory::MissingAsset,
            Self::EngineBusy | Self::Runtime(_) => ErrorCategory::Generic,
        }
    }

    /// Returns true for the network family of errors
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout(_)
                | Self::NetworkOffline(_)
                | Self::NetworkConnectionLost(_)
                | Self::NetworkHostUnreachable(_)
                | Self::GenericNetwork(_)
        )
    }

    /// Explanation shown in place of an assistant reply when batch generation fails
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelNotFound(id) => format!(
                "I couldn't find a model called '{}'. Pick one of the installed models and try again.",
                id
            ),
            Self::ModelUnavailableOffline(id) => format!(
                "Offline mode is on and '{}' hasn't been downloaded yet. Turn off offline mode once to download it.",
                id
            ),
            Self::NetworkTimeout(_) => "The connection timed out while fetching the model. If it was downloaded before, the local copy can still be used; try again.".to_string(),
            Self::NetworkOffline(_) => "You appear to be offline, so the model couldn't be downloaded. Connect to the internet or enable offline mode if the model is already installed.".to_string(),
            Self::NetworkConnectionLost(_) => "The connection dropped while downloading the model. Try again when your network is stable.".to_string(),
            Self::NetworkHostUnreachable(_) => "The model server couldn't be reached. Check your network or try again later.".to_string(),
            Self::GenericNetwork(message) => format!(
                "A network problem stopped the model from loading ({}). Try again later.",
                message
            ),
            Self::ModelAssetMissing { .. } => "The model files are missing or incomplete. Download the model again to continue.".to_string(),
            Self::EngineBusy => "I'm still working on the previous request.".to_string(),
            Self::Runtime(message) => format!("Something went wrong while generating a reply: {}", message),
        }
    }
}
