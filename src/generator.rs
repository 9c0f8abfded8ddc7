// Story Generator - Prompt fitting and bounded retry around a text sampler
//
// Prepares the prompt, asks the sampler for a continuation and sanitizes
// it. Empty results are retried with a shorter prompt until the depth
// limit is reached, then an empty string is returned.

use tracing::{debug, info, warn};

use crate::error::{GeneratorError, Result};
use crate::generator_types::{GenerationRequest, GenerationResult, SamplingConfig};
use crate::prompt::{cut_down_prompt, fit_prompt, prompt_replace};
use crate::sanitizer::OutputSanitizer;

/// Deepest retry level; a request starting at depth 1 makes at most 20 calls
pub const MAX_DEPTH: u32 = 20;

/// Encode, sample and decode one continuation
///
/// Implementations own their model session exclusively and rebuild any
/// sampling state when handed a config different from the last one.
pub trait TextSampler {
    /// Return the decoded continuation only, without the prompt
    fn sample(&mut self, prompt: &str, config: &SamplingConfig) -> Result<String>;
}

/// Story continuation generator over a [`TextSampler`]
#[derive(Debug)]
pub struct StoryGenerator<S> {
    sampler: S,
    sampling: SamplingConfig,
    default_generate_num: usize,
    censor: bool,
}

impl<S: TextSampler> StoryGenerator<S> {
    /// Create a generator with the given sampling parameters
    pub fn new(sampler: S, sampling: SamplingConfig, censor: bool) -> Self {
        Self {
            sampler,
            default_generate_num: sampling.length,
            sampling,
            censor,
        }
    }

    /// Current sampling parameters
    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    pub fn censor(&self) -> bool {
        self.censor
    }

    /// Generation length the generator was built with
    pub fn default_generate_num(&self) -> usize {
        self.default_generate_num
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Change the temperature, rebuilding the sampling config
    pub fn change_temp(&mut self, temperature: f64) {
        info!("StoryGenerator: temperature {} -> {}", self.sampling.temperature, temperature);
        self.sampling = self.sampling.with_temperature(temperature);
    }

    /// Change top-k, rebuilding the sampling config
    pub fn change_topk(&mut self, top_k: usize) {
        info!("StoryGenerator: top_k {} -> {}", self.sampling.top_k, top_k);
        self.sampling = self.sampling.with_top_k(top_k);
    }

    /// Request filled in from the generator's current settings
    pub fn request(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            generate_num: self.sampling.length,
            temperature: self.sampling.temperature,
            top_k: self.sampling.top_k,
            top_p: self.sampling.top_p,
            censor: self.censor,
            depth: 1,
            seed: None,
        }
    }

    /// Generate a continuation with the current settings
    pub fn generate(&mut self, prompt: &str) -> Result<String> {
        let request = self.request(prompt);
        Ok(self.generate_request(&request)?.text)
    }

    /// Sample once, with prompt fitting but no sanitizing
    pub fn generate_raw(&mut self, prompt: &str) -> Result<String> {
        let fitted = fit_prompt(prompt);
        self.sampler.sample(&fitted, &self.sampling)
    }

    /// Run a request through the retry loop
    ///
    /// Each empty result drops the oldest player action from the prompt
    /// and tries again while the depth is below [`MAX_DEPTH`]. Depth 0 is
    /// treated as depth 1, so no request makes more than [`MAX_DEPTH`] calls.
    pub fn generate_request(&mut self, request: &GenerationRequest) -> Result<GenerationResult> {
        if request.depth > MAX_DEPTH {
            return Err(GeneratorError::InvalidRequest(format!(
                "depth must be at most {MAX_DEPTH}, got {}",
                request.depth
            )));
        }

        let sampling = self.sampling.for_request(request);
        let sanitizer = OutputSanitizer::new(request.censor);

        let mut prompt = prompt_replace(&request.prompt).to_string();
        let mut depth = request.depth.max(1);
        let mut attempts = 0;

        loop {
            let fitted = fit_prompt(&prompt);
            debug!("StoryGenerator: depth {} prompt {:?}", depth, fitted);

            let raw = self.sampler.sample(&fitted, &sampling)?;
            attempts += 1;
            debug!("StoryGenerator: raw output {:?}", raw);

            let text = sanitizer.sanitize(&raw);
            if !text.is_empty() {
                return Ok(GenerationResult {
                    text,
                    attempts,
                    prompt: fitted,
                });
            }

            if depth >= MAX_DEPTH {
                warn!(
                    "StoryGenerator: giving up after {} empty results",
                    attempts
                );
                return Ok(GenerationResult {
                    text: String::new(),
                    attempts,
                    prompt: fitted,
                });
            }

            prompt = prompt_replace(&cut_down_prompt(&prompt)).to_string();
            depth += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Sampler replaying scripted outputs and recording what it was asked
    #[derive(Default)]
    struct ScriptedSampler {
        outputs: VecDeque<String>,
        fallback: String,
        prompts: Vec<String>,
        configs: Vec<SamplingConfig>,
    }

    impl ScriptedSampler {
        fn new(outputs: &[&str], fallback: &str) -> Self {
            Self {
                outputs: outputs.iter().map(|s| s.to_string()).collect(),
                fallback: fallback.to_string(),
                ..Self::default()
            }
        }
    }

    impl TextSampler for ScriptedSampler {
        fn sample(&mut self, prompt: &str, config: &SamplingConfig) -> Result<String> {
            self.prompts.push(prompt.to_string());
            self.configs.push(*config);
            Ok(self
                .outputs
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()))
        }
    }

    struct FailingSampler;

    impl TextSampler for FailingSampler {
        fn sample(&mut self, _prompt: &str, _config: &SamplingConfig) -> Result<String> {
            Err(GeneratorError::Model("session closed".to_string()))
        }
    }

    fn generator(sampler: ScriptedSampler) -> StoryGenerator<ScriptedSampler> {
        StoryGenerator::new(sampler, SamplingConfig::default().with_seed(1), false)
    }

    #[test]
    fn test_generate_returns_sanitized_text() {
        let mut generator = generator(ScriptedSampler::new(
            &[" The dragon roars. It spreads its"],
            "",
        ));

        let text = generator.generate("You enter the cave. ").unwrap();
        // Leading space is not uppercase, so lowering the first char is a no-op
        assert_eq!(text, " The dragon roars.");
        assert_eq!(generator.sampler().prompts, vec!["You enter the cave."]);
    }

    #[test]
    fn test_retry_shrinks_prompt() {
        let mut generator = generator(ScriptedSampler::new(
            &["\"", "\"", "The wind howls. And"],
            "",
        ));

        let request = generator.request("Intro.> one> two> three");
        let result = generator.generate_request(&request).unwrap();

        assert_eq!(result.text, "The wind howls.");
        assert_eq!(result.attempts, 3);
        assert_eq!(
            generator.sampler().prompts,
            vec!["Intro.> one> two> three", "Intro.> two> three", "Intro.> three"]
        );
        assert_eq!(result.prompt, "Intro.> three");
    }

    #[test]
    fn test_gives_up_after_twenty_attempts() {
        let mut generator = generator(ScriptedSampler::new(&[], "\""));

        let request = generator.request("Intro.> a> b");
        let result = generator.generate_request(&request).unwrap();

        assert!(result.is_empty());
        assert_eq!(result.attempts, MAX_DEPTH);
        assert_eq!(generator.sampler().prompts.len(), MAX_DEPTH as usize);
        // Prompt stops shrinking once no action is left to drop
        assert_eq!(generator.sampler().prompts.last().unwrap(), "Intro.> b");
    }

    #[test]
    fn test_depth_limits_remaining_attempts() {
        let mut generator = generator(ScriptedSampler::new(&[], ""));

        let mut request = generator.request("prompt");
        request.depth = 18;
        let result = generator.generate_request(&request).unwrap();
        assert_eq!(result.attempts, 3);

        request.depth = MAX_DEPTH;
        let result = generator.generate_request(&request).unwrap();
        assert_eq!(result.attempts, 1);

        request.depth = MAX_DEPTH + 1;
        assert!(matches!(
            generator.generate_request(&request),
            Err(GeneratorError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_depth_zero_is_capped_at_max_depth() {
        let mut generator = generator(ScriptedSampler::new(&[], ""));

        let mut request = generator.request("Intro.> a> b");
        request.depth = 0;
        let result = generator.generate_request(&request).unwrap();

        assert!(result.is_empty());
        assert_eq!(result.attempts, MAX_DEPTH);
        assert_eq!(generator.sampler().prompts.len(), MAX_DEPTH as usize);
    }

    #[test]
    fn test_censor_request() {
        let mut generator = generator(ScriptedSampler::new(&["Damn, it is cold. You"], ""));

        let mut request = generator.request("> wait");
        request.censor = true;
        let result = generator.generate_request(&request).unwrap();
        assert_eq!(result.text, "****, it is cold.");
    }

    #[test]
    fn test_long_prompt_is_fitted_before_sampling() {
        let mut generator = generator(ScriptedSampler::new(&["Done."], ""));

        let mut prompt = String::from("Intro.");
        for i in 0..200 {
            prompt.push_str(&format!("> action number {i}"));
        }
        generator.generate(&prompt).unwrap();

        let sent = &generator.sampler().prompts[0];
        assert!(sent.chars().count() <= crate::prompt::MAX_PROMPT_CHARS);
        assert!(sent.starts_with("Intro.> "));
        assert!(sent.ends_with("> action number 199"));
    }

    #[test]
    fn test_change_temp_and_topk_rebuild_config() {
        let mut generator = generator(ScriptedSampler::new(&[], "Fine."));

        generator.change_temp(0.7);
        generator.change_topk(5);
        assert_eq!(generator.sampling().temperature, 0.7);
        assert_eq!(generator.sampling().top_k, 5);

        generator.generate("> go").unwrap();
        let used = generator.sampler().configs[0];
        assert_eq!(used, *generator.sampling());
        assert_eq!(generator.default_generate_num(), 80);
    }

    #[test]
    fn test_request_seed_is_passed_to_sampler() {
        let mut generator = generator(ScriptedSampler::new(&[], "Fine."));

        let mut request = generator.request("> go");
        request.seed = Some(1234);
        request.generate_num = 20;
        generator.generate_request(&request).unwrap();

        let used = generator.sampler().configs[0];
        assert_eq!(used.seed, 1234);
        assert_eq!(used.length, 20);
    }

    #[test]
    fn test_sampler_errors_propagate() {
        let mut generator =
            StoryGenerator::new(FailingSampler, SamplingConfig::default(), false);
        assert!(matches!(
            generator.generate("> look"),
            Err(GeneratorError::Model(_))
        ));
    }

    #[test]
    fn test_generate_raw_skips_sanitizing() {
        let mut generator = generator(ScriptedSampler::new(&["# raw *text"], ""));
        assert_eq!(generator.generate_raw("prompt ").unwrap(), "# raw *text");
        assert_eq!(generator.sampler().prompts, vec!["prompt "]);
    }
}
