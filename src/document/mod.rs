//! Document ingestion and summarization

pub mod chunker;
mod cleanup;
mod error;
mod extract;
mod pipeline;

pub use chunker::{chunk, DocumentChunk};
pub use cleanup::{clean_model_output, document_title, truncate_chars};
pub use error::DocumentError;
pub use extract::{DocumentKind, PlainTextExtractor, TextExtractor};
pub use pipeline::{
    DocumentSummary, PipelineSnapshot, ProcessingState, SummarizationConfig,
    SummarizationPipeline, SummaryOutcome,
};
