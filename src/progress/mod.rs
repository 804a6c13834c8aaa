//! Progress reporting for model acquisition, generation and summarization

mod handler;
mod logging;

pub use handler::{AcquisitionSource, NoOpHandler, ProgressEvent, ProgressHandler};
pub use logging::LoggingHandler;
