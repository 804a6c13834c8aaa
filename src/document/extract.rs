//! Text extraction from document files

use super::error::DocumentError;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Document format, derived from the file extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PlainText,
    Markdown,
    Pdf,
    Docx,
    /// Lowercased extension, empty when there is none
    Other(String),
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "text" => DocumentKind::PlainText,
            "md" | "markdown" => DocumentKind::Markdown,
            "pdf" => DocumentKind::Pdf,
            "docx" => DocumentKind::Docx,
            _ => DocumentKind::Other(ext),
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::PlainText => write!(f, "plain text"),
            DocumentKind::Markdown => write!(f, "markdown"),
            DocumentKind::Pdf => write!(f, "PDF"),
            DocumentKind::Docx => write!(f, "DOCX"),
            DocumentKind::Other(ext) if ext.is_empty() => write!(f, "file without extension"),
            DocumentKind::Other(ext) => write!(f, ".{}", ext),
        }
    }
}

/// Produces plain text for a document of a given kind
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path, kind: &DocumentKind) -> Result<String, DocumentError>;
}

/// Reads UTF-8 text and markdown files as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path, kind: &DocumentKind) -> Result<String, DocumentError> {
        match kind {
            DocumentKind::PlainText | DocumentKind::Markdown => {}
            other => return Err(DocumentError::UnsupportedFormat(other.to_string())),
        }

        let bytes = std::fs::read(path).map_err(|e| DocumentError::ExtractionFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let text = String::from_utf8(bytes).map_err(|e| DocumentError::ExtractionFailed {
            path: path.to_path_buf(),
            message: format!("not valid UTF-8 ({})", e.utf8_error()),
        })?;

        debug!(path = %path.display(), chars = text.chars().count(), "Extracted text");
        Ok(text)
    }
}
