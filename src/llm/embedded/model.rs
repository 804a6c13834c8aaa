//! Quantized Qwen2 model loaded with Candle

use super::download::ModelFiles;
use super::hardware::ComputeDevice;
use crate::llm::catalog::ModelDescriptor;
use crate::llm::error::InferenceError;
use crate::llm::runtime::{DecodeSession, LoadedModel};
use crate::llm::types::SamplingConfig;
use anyhow::{Context, Result};
use candle_core::{quantized::gguf_file, Device, IndexOp, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_qwen2::ModelWeights as QuantizedQwen2;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

// Qwen2 <|im_end|> and <|endoftext|>
const FALLBACK_EOS: [u32; 2] = [151645, 151643];

pub struct CandleModel {
    descriptor: ModelDescriptor,
    weights: Mutex<QuantizedQwen2>,
    tokenizer: Tokenizer,
    device: Device,
    eos_tokens: Vec<u32>,
}

impl CandleModel {
    /// Loads weights and tokenizer, falling back to CPU if the accelerator rejects the model
    pub fn load(
        descriptor: ModelDescriptor,
        files: &ModelFiles,
        device: ComputeDevice,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        info!("Loading {} on {} device...", descriptor.display_name, device);
        let preferred = device.create();
        let (weights, device) = match Self::load_gguf(&files.weights, &preferred) {
            Ok(weights) => (weights, preferred),
            Err(e) if !preferred.is_cpu() => {
                warn!("Failed to load GGUF model on {}: {}. Falling back to CPU", device, e);
                let weights = Self::load_gguf(&files.weights, &Device::Cpu)
                    .context("Failed to load GGUF model on CPU fallback")?;
                (weights, Device::Cpu)
            }
            Err(e) => return Err(e),
        };

        let eos_tokens: Vec<u32> = ["<|im_end|>", "<|endoftext|>"]
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        let eos_tokens = if eos_tokens.is_empty() {
            FALLBACK_EOS.to_vec()
        } else {
            eos_tokens
        };

        info!("Model {} loaded", descriptor.id);
        Ok(Self {
            descriptor,
            weights: Mutex::new(weights),
            tokenizer,
            device,
            eos_tokens,
        })
    }

    fn load_gguf(path: &Path, device: &Device) -> Result<QuantizedQwen2> {
        debug!("Loading GGUF model from: {}", path.display());

        let mut file = std::fs::File::open(path).context("Failed to open GGUF model file")?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow::anyhow!("Failed to read GGUF file: {}", e))?;

        QuantizedQwen2::from_gguf(content, &mut file, device)
            .context("Failed to load model weights from GGUF")
    }
}

impl LoadedModel for CandleModel {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn start_decode<'a>(
        &'a self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<Box<dyn DecodeSession + 'a>, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| InferenceError::Runtime(format!("Tokenization failed: {}", e)))?;
        let prompt_tokens = encoding.get_ids().to_vec();
        if prompt_tokens.is_empty() {
            return Err(InferenceError::Runtime("Prompt produced no tokens".to_string()));
        }
        debug!("Input tokens: {}", prompt_tokens.len());

        let weights = self
            .weights
            .lock()
            .map_err(|_| InferenceError::Runtime("Model state poisoned".to_string()))?;

        Ok(Box::new(CandleDecodeSession {
            model: self,
            weights,
            sampler: LogitsProcessor::new(
                sampling.seed,
                Some(sampling.temperature),
                sampling.top_p,
            ),
            prompt_tokens,
            last_token: None,
            position: 0,
        }))
    }
}

struct CandleDecodeSession<'a> {
    model: &'a CandleModel,
    weights: MutexGuard<'a, QuantizedQwen2>,
    sampler: LogitsProcessor,
    prompt_tokens: Vec<u32>,
    last_token: Option<u32>,
    position: usize,
}

impl CandleDecodeSession<'_> {
    fn step(&mut self) -> candle_core::Result<u32> {
        // The whole prompt goes in first; afterwards only the previous token, on top of
        // the KV cache
        let input = match self.last_token {
            None => Tensor::new(self.prompt_tokens.as_slice(), &self.model.device)?,
            Some(token) => Tensor::new(&[token], &self.model.device)?,
        };
        let input_len = input.dim(0)?;

        let logits = self.weights.forward(&input.unsqueeze(0)?, self.position)?;
        self.position += input_len;

        // Full models return [batch, seq, vocab], quantized ones [batch, vocab]
        let logits = if logits.dims().len() == 3 {
            let seq_len = logits.dim(1)?;
            logits.i((0, seq_len - 1))?
        } else {
            logits.squeeze(0)?
        };

        self.sampler.sample(&logits)
    }
}

impl DecodeSession for CandleDecodeSession<'_> {
    fn next_token(&mut self) -> Result<Option<u32>, InferenceError> {
        let token = self
            .step()
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        if self.model.eos_tokens.contains(&token) {
            return Ok(None);
        }
        self.last_token = Some(token);
        Ok(Some(token))
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String, InferenceError> {
        self.model
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| InferenceError::Runtime(format!("Decoding failed: {}", e)))
    }
}
