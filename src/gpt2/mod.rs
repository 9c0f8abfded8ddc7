// GPT-2 Module - Local GPT-2 backend for the story generator
//
// Configuration and model-directory handling are always compiled so the
// layout can be validated without the inference stack. The candle model
// is only built with the `gpt2` feature.

pub mod config;
pub mod model_manager;
pub mod sampler;

#[cfg(feature = "gpt2")]
pub mod model;

pub use config::{GeneratorConfig, HParams};
pub use model_manager::{ModelFiles, ModelManager};
pub use sampler::Gpt2Sampler;

use crate::error::Result;
use crate::generator::StoryGenerator;

/// Load the configured model and wrap it in a generator
pub fn load_generator(config: &GeneratorConfig) -> Result<StoryGenerator<Gpt2Sampler>> {
    let manager = ModelManager::new(config.resolved_models_dir());
    let files = manager.validate_model(&config.model_name)?;
    let sampler = Gpt2Sampler::load(&files)?;
    Ok(StoryGenerator::new(sampler, config.sampling(), config.censor))
}
