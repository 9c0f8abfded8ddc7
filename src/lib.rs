// Story Engine - GPT-2 story continuation for interactive fiction
//
// Wraps a pretrained GPT-2 checkpoint and turns its raw samples into
// usable story text: prompt fitting, sentence trimming, markup cleanup,
// optional profanity filtering and bounded retries on empty output.

pub mod censor;
pub mod error;
pub mod generator;
pub mod generator_types;
pub mod logging;
pub mod prompt;
pub mod sanitizer;
pub mod sentence;

// GPT-2 backend: configuration and model layout are always available,
// the candle model itself is behind the `gpt2` feature.
pub mod gpt2;

pub use error::{GeneratorError, Result};
pub use generator::{StoryGenerator, TextSampler, MAX_DEPTH};
pub use generator_types::{GenerationRequest, GenerationResult, SamplingConfig};
