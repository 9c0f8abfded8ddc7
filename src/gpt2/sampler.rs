// GPT-2 Sampler - Encode, sample and decode with a local GPT-2 checkpoint
//
// Owns the tokenizer, the model weights and the logits processor. The
// processor is rebuilt whenever the generator hands over a different
// sampling config, so parameter changes take effect on the next call.
// The prompt is encoded once per call; after that only the newest token
// is fed through the model, reusing its key/value cache.

use crate::error::{GeneratorError, Result};
use crate::generator::TextSampler;
use crate::generator_types::SamplingConfig;
use crate::gpt2::model_manager::ModelFiles;

#[cfg(feature = "gpt2")]
use {
    crate::gpt2::config::HParams,
    crate::gpt2::model::Gpt2Model,
    candle_core::{DType, Device, Tensor},
    candle_nn::VarBuilder,
    candle_transformers::generation::{LogitsProcessor, Sampling},
    tokenizers::Tokenizer,
    tracing::{debug, info},
};

/// GPT-2 end-of-text token, used as context when the prompt is empty
#[cfg(feature = "gpt2")]
const END_OF_TEXT: &str = "<|endoftext|>";

/// Local GPT-2 sampler backed by candle
#[cfg(feature = "gpt2")]
pub struct Gpt2Sampler {
    model: Gpt2Model,
    tokenizer: Tokenizer,
    hparams: HParams,
    device: Device,
    processor: Option<(SamplingConfig, LogitsProcessor)>,
}

#[cfg(feature = "gpt2")]
impl Gpt2Sampler {
    /// Load hparams, tokenizer and the checkpoint weights
    pub fn load(files: &ModelFiles) -> Result<Self> {
        let hparams = HParams::from_file(&files.hparams)?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| GeneratorError::Tokenizer(format!("Failed to load tokenizer: {e}")))?;

        let device = Device::cuda_if_available(0)?;
        info!(
            "Gpt2Sampler: loading {} on {:?}",
            files.checkpoint.display(),
            device
        );

        let weights = candle_core::safetensors::load(&files.checkpoint, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = Gpt2Model::load(vb, &hparams)?;

        info!(
            "Gpt2Sampler: model ready (n_layer={}, n_embd={}, n_ctx={})",
            hparams.n_layer, hparams.n_embd, hparams.n_ctx
        );

        Ok(Self {
            model,
            tokenizer,
            hparams,
            device,
            processor: None,
        })
    }

    pub fn hparams(&self) -> &HParams {
        &self.hparams
    }

    fn encode(&self, prompt: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| GeneratorError::Tokenizer(format!("Tokenization failed: {e}")))?;
        let mut ids = encoding.get_ids().to_vec();

        if ids.is_empty() {
            let end_of_text = self.tokenizer.token_to_id(END_OF_TEXT).ok_or_else(|| {
                GeneratorError::Tokenizer(format!("Tokenizer has no {END_OF_TEXT} token"))
            })?;
            ids.push(end_of_text);
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, false)
            .map_err(|e| GeneratorError::Tokenizer(format!("Decoding failed: {e}")))
    }

    /// Logits processor for this config, rebuilt when the config changed
    fn logits_processor(&mut self, config: &SamplingConfig) -> &mut LogitsProcessor {
        let stale = self
            .processor
            .as_ref()
            .map_or(true, |(built, _)| built != config);
        if stale {
            debug!(
                "Gpt2Sampler: rebuilding sampler (temperature={}, top_k={}, top_p={}, seed={})",
                config.temperature, config.top_k, config.top_p, config.seed
            );
            self.processor = None;
        }

        &mut self
            .processor
            .get_or_insert_with(|| {
                (*config, LogitsProcessor::from_sampling(config.seed, sampling_for(config)))
            })
            .1
    }
}

#[cfg(feature = "gpt2")]
impl TextSampler for Gpt2Sampler {
    fn sample(&mut self, prompt: &str, config: &SamplingConfig) -> Result<String> {
        let mut tokens = self.encode(prompt)?;
        let mut generated = Vec::with_capacity(config.length);
        let n_ctx = self.hparams.n_ctx;

        debug!(
            "Gpt2Sampler: {} context tokens, sampling {}",
            tokens.len(),
            config.length
        );

        self.model.clear_kv_cache();
        // Positions already held in the model's key/value cache
        let mut cached = 0;

        for _ in 0..config.length {
            let input_ids = if cached == 0 {
                &tokens[tokens.len().saturating_sub(n_ctx)..]
            } else {
                &tokens[tokens.len() - 1..]
            };
            let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .forward(&input, cached)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;
            cached += input_ids.len();

            let next = self.logits_processor(config).sample(&logits)?;
            tokens.push(next);
            generated.push(next);

            // Out of positions: start over on the trailing n_ctx tokens
            if cached >= n_ctx {
                debug!("Gpt2Sampler: context window full, re-encoding");
                self.model.clear_kv_cache();
                cached = 0;
            }
        }

        self.decode(&generated)
    }
}

/// Map sampling parameters onto candle's sampling strategies
#[cfg(feature = "gpt2")]
fn sampling_for(config: &SamplingConfig) -> Sampling {
    if config.temperature <= 0.0 {
        Sampling::ArgMax
    } else if config.top_k == 0 {
        Sampling::TopP {
            p: config.top_p,
            temperature: config.temperature,
        }
    } else {
        Sampling::TopKThenTopP {
            k: config.top_k,
            p: config.top_p,
            temperature: config.temperature,
        }
    }
}

/// Stub implementation when the gpt2 feature is disabled
#[cfg(not(feature = "gpt2"))]
pub struct Gpt2Sampler {
    _phantom: std::marker::PhantomData<()>,
}

#[cfg(not(feature = "gpt2"))]
impl Gpt2Sampler {
    pub fn load(_files: &ModelFiles) -> Result<Self> {
        Err(GeneratorError::Model("gpt2 feature not enabled".to_string()))
    }
}

#[cfg(not(feature = "gpt2"))]
impl TextSampler for Gpt2Sampler {
    fn sample(&mut self, _prompt: &str, _config: &SamplingConfig) -> Result<String> {
        Err(GeneratorError::Model("gpt2 feature not enabled".to_string()))
    }
}
