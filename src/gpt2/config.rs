// GPT-2 Configuration - Model hyper-parameters and generator settings
//
// `hparams.json` ships next to each checkpoint. Missing keys fall back to
// GPT-2 small. Generator settings default to the story defaults and can be
// overridden from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::{GeneratorError, Result};
use crate::generator_types::{
    SamplingConfig, DEFAULT_GENERATE_NUM, DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P,
};

/// Name of the hyper-parameter file inside a model directory
pub const HPARAMS_FILE: &str = "hparams.json";

/// GPT-2 architecture hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HParams {
    pub n_vocab: usize,
    pub n_ctx: usize,
    pub n_embd: usize,
    pub n_head: usize,
    pub n_layer: usize,
}

impl Default for HParams {
    fn default() -> Self {
        Self {
            n_vocab: 50257,
            n_ctx: 1024,
            n_embd: 768,
            n_head: 12,
            n_layer: 12,
        }
    }
}

impl HParams {
    /// Read `hparams.json`, overriding the defaults with its keys
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let hparams: Self = serde_json::from_str(&content)?;
        hparams.validate()?;
        Ok(hparams)
    }

    fn validate(&self) -> Result<()> {
        if self.n_head == 0 || self.n_embd % self.n_head != 0 {
            return Err(GeneratorError::Model(format!(
                "n_embd ({}) must be a multiple of n_head ({})",
                self.n_embd, self.n_head
            )));
        }
        if self.n_ctx == 0 || self.n_vocab == 0 {
            return Err(GeneratorError::Model(
                "n_ctx and n_vocab must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }
}

/// Settings for building a story generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model_name: String,
    /// Directory holding one sub-directory per model; `~` and `$VAR` expand
    pub models_dir: String,
    pub generate_num: usize,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    pub censor: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_name: "model_v5".to_string(),
            models_dir: "generator/gpt2/models".to_string(),
            generate_num: DEFAULT_GENERATE_NUM,
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            censor: false,
        }
    }
}

impl GeneratorConfig {
    /// Load settings from a JSON file; absent fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Models directory with `~` and environment variables expanded
    pub fn resolved_models_dir(&self) -> PathBuf {
        expand_path(&self.models_dir)
    }

    /// Directory of the configured model
    pub fn model_dir(&self) -> PathBuf {
        self.resolved_models_dir().join(&self.model_name)
    }

    /// Fresh sampling config from these settings
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig::new(self.generate_num, self.temperature, self.top_k, self.top_p)
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references
///
/// Unknown variables are left as written.
pub fn expand_path(input: &str) -> PathBuf {
    let expanded = expand_vars(input);

    if expanded == "~" || expanded.starts_with("~/") {
        if let Some(dirs) = BaseDirs::new() {
            let rest = expanded.trim_start_matches('~').trim_start_matches('/');
            return dirs.home_dir().join(rest);
        }
    }

    PathBuf::from(expanded)
}

fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}
