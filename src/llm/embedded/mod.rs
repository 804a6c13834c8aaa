//! On-device inference with Candle
//!
//! Quantized GGUF models are fetched from the HuggingFace Hub into the standard cache and
//! run on the best available device (CUDA, Metal, or CPU), falling back to CPU when the
//! accelerator cannot load the model.

mod download;
mod hardware;
mod model;
mod runtime;

pub use download::{ModelFiles, ModelStore};
pub use hardware::{ComputeDevice, HardwareCapabilities, HardwareDetector};
pub use model::CandleModel;
pub use runtime::CandleRuntime;
