// Model Manager - Locate GPT-2 model files on disk
//
// Each model lives in its own directory under the models directory:
//   <models_dir>/<model_name>/hparams.json
//   <models_dir>/<model_name>/tokenizer.json
//   <models_dir>/<model_name>/*.safetensors
// The most recently written checkpoint is the one that gets loaded.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{GeneratorError, Result};
use crate::gpt2::config::HPARAMS_FILE;

/// Name of the tokenizer file inside a model directory
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Extension of checkpoint files
pub const CHECKPOINT_EXTENSION: &str = "safetensors";

/// Resolved paths of a complete model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub model_dir: PathBuf,
    pub hparams: PathBuf,
    pub tokenizer: PathBuf,
    pub checkpoint: PathBuf,
}

/// Manager for model directories
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Directory of a specific model
    pub fn model_dir(&self, model_name: &str) -> PathBuf {
        self.models_dir.join(model_name)
    }

    /// Most recently modified checkpoint in a model directory
    ///
    /// Ties on modification time go to the lexically last file name.
    pub fn latest_checkpoint(&self, model_name: &str) -> Result<PathBuf> {
        let dir = self.model_dir(model_name);
        if !dir.is_dir() {
            return Err(GeneratorError::MissingFile(dir));
        }

        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_checkpoint = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(CHECKPOINT_EXTENSION);
            if !is_checkpoint {
                continue;
            }

            let modified = fs::metadata(&path)?.modified()?;
            let newer = match &latest {
                Some((time, best)) => (modified, &path) > (*time, best),
                None => true,
            };
            if newer {
                latest = Some((modified, path));
            }
        }

        latest
            .map(|(_, path)| path)
            .ok_or(GeneratorError::NoCheckpoint(dir))
    }

    /// Check that every file of a model is present
    pub fn validate_model(&self, model_name: &str) -> Result<ModelFiles> {
        let model_dir = self.model_dir(model_name);

        let hparams = model_dir.join(HPARAMS_FILE);
        if !hparams.is_file() {
            return Err(GeneratorError::MissingFile(hparams));
        }

        let tokenizer = model_dir.join(TOKENIZER_FILE);
        if !tokenizer.is_file() {
            return Err(GeneratorError::MissingFile(tokenizer));
        }

        let checkpoint = self.latest_checkpoint(model_name)?;

        tracing::debug!(
            "ModelManager: {} -> checkpoint {}",
            model_name,
            checkpoint.display()
        );

        Ok(ModelFiles {
            model_dir,
            hparams,
            tokenizer,
            checkpoint,
        })
    }

    /// Check if a model has everything needed to load
    pub fn is_model_available(&self, model_name: &str) -> bool {
        self.validate_model(model_name).is_ok()
    }

    /// Names of all complete models, sorted
    pub fn scan_models(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.models_dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
            .filter(|name| self.is_model_available(name))
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn create_test_manager(name: &str) -> ModelManager {
        let dir = env::temp_dir().join("story_engine_model_test").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        ModelManager::new(dir)
    }

    fn write_model(manager: &ModelManager, model_name: &str, checkpoints: &[&str]) {
        let dir = manager.model_dir(model_name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(HPARAMS_FILE), "{}").unwrap();
        fs::write(dir.join(TOKENIZER_FILE), "{}").unwrap();
        for checkpoint in checkpoints {
            fs::write(dir.join(checkpoint), b"weights").unwrap();
        }
    }

    #[test]
    fn test_validate_complete_model() {
        let manager = create_test_manager("complete");
        write_model(&manager, "model_v5", &["model.safetensors"]);

        let files = manager.validate_model("model_v5").unwrap();
        assert_eq!(files.model_dir, manager.model_dir("model_v5"));
        assert!(files.checkpoint.ends_with("model.safetensors"));
        assert!(manager.is_model_available("model_v5"));
    }

    #[test]
    fn test_missing_files() {
        let manager = create_test_manager("missing");

        assert!(matches!(
            manager.validate_model("nonexistent"),
            Err(GeneratorError::MissingFile(_))
        ));

        write_model(&manager, "no_weights", &[]);
        assert!(matches!(
            manager.validate_model("no_weights"),
            Err(GeneratorError::NoCheckpoint(_))
        ));

        write_model(&manager, "no_tokenizer", &["model.safetensors"]);
        fs::remove_file(manager.model_dir("no_tokenizer").join(TOKENIZER_FILE)).unwrap();
        match manager.validate_model("no_tokenizer") {
            Err(GeneratorError::MissingFile(path)) => assert!(path.ends_with(TOKENIZER_FILE)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_latest_checkpoint_ignores_other_files() {
        let manager = create_test_manager("latest");
        write_model(&manager, "model", &["a.safetensors", "b.safetensors", "notes.txt"]);

        let checkpoint = manager.latest_checkpoint("model").unwrap();
        assert_eq!(checkpoint.extension().unwrap(), "safetensors");
    }

    #[test]
    fn test_scan_models() {
        let manager = create_test_manager("scan");
        write_model(&manager, "model_v5", &["model.safetensors"]);
        write_model(&manager, "model_v4", &["model.safetensors"]);
        write_model(&manager, "incomplete", &[]);

        assert_eq!(manager.scan_models(), vec!["model_v4", "model_v5"]);
    }

    #[test]
    fn test_scan_missing_directory() {
        let manager = ModelManager::new(env::temp_dir().join("story_engine_no_such_dir"));
        assert!(manager.scan_models().is_empty());
    }
}
