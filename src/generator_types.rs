// Generator Types - Requests, results and sampling configuration
//
// These types are always available, with or without the GPT-2 backend.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default number of tokens sampled per request
pub const DEFAULT_GENERATE_NUM: usize = 80;
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_TOP_K: usize = 30;
pub const DEFAULT_TOP_P: f64 = 0.9;

/// Immutable sampling parameters for one sampler build
///
/// Changing a parameter yields a new config with a freshly drawn seed;
/// backends rebuild their sampler whenever the config they see changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Tokens to sample after the prompt
    pub length: usize,
    /// Softmax temperature (0.0 = greedy)
    pub temperature: f64,
    /// Top-k cutoff (0 = disabled)
    pub top_k: usize,
    /// Nucleus sampling threshold
    pub top_p: f64,
    pub seed: u64,
}

impl SamplingConfig {
    pub fn new(length: usize, temperature: f64, top_k: usize, top_p: f64) -> Self {
        Self {
            length,
            temperature,
            top_k,
            top_p,
            seed: rand::rng().random_range(0..100_000),
        }
    }

    /// Same parameters, new seed
    pub fn regenerate(&self) -> Self {
        Self::new(self.length, self.temperature, self.top_k, self.top_p)
    }

    pub fn with_temperature(&self, temperature: f64) -> Self {
        Self {
            temperature,
            ..self.regenerate()
        }
    }

    pub fn with_top_k(&self, top_k: usize) -> Self {
        Self {
            top_k,
            ..self.regenerate()
        }
    }

    /// Pin the seed, keeping every other parameter
    pub fn with_seed(&self, seed: u64) -> Self {
        Self { seed, ..*self }
    }

    /// Config matching the request's parameters
    ///
    /// Keeps this config (and its seed) when nothing differs, so repeated
    /// requests reuse the same sampler.
    pub fn for_request(&self, request: &GenerationRequest) -> Self {
        let same_params = self.length == request.generate_num
            && self.temperature == request.temperature
            && self.top_k == request.top_k
            && self.top_p == request.top_p;

        let config = if same_params {
            *self
        } else {
            Self::new(
                request.generate_num,
                request.temperature,
                request.top_k,
                request.top_p,
            )
        };

        match request.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_GENERATE_NUM,
            DEFAULT_TEMPERATURE,
            DEFAULT_TOP_K,
            DEFAULT_TOP_P,
        )
    }
}

/// A single story continuation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Generation-length budget in tokens
    pub generate_num: usize,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    /// Mask profane words in the output
    pub censor: bool,
    /// Retry depth to start from (0-20)
    pub depth: u32,
    /// Fixed sampling seed; `None` keeps the generator's current seed
    pub seed: Option<u64>,
}

impl GenerationRequest {
    /// Request with default parameters for the given prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            generate_num: DEFAULT_GENERATE_NUM,
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            censor: false,
            depth: 1,
            seed: None,
        }
    }
}

/// Outcome of a generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Sanitized text, empty when every attempt sanitized to nothing
    pub text: String,
    /// Number of model calls made
    pub attempts: u32,
    /// Prompt sent to the model on the final attempt
    pub prompt: String,
}

impl GenerationResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
