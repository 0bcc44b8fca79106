//! Hugging Face Hub loaders for classifier weights, configs and tokenizers.
//!
//! Files are resolved through the local hub cache, downloading on first use.
//!
//! - [`HfLoader`] - fetch a single file from a model repository
//! - [`TokenizerLoader`] - fetch and parse `tokenizer.json`
//! - [`ClassifierFilesLoader`] - fetch `config.json` plus the weight file

use std::path::PathBuf;

use hf_hub::api::sync::Api as HfApi;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use crate::core::{AgentError, Result};

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct HfLoader {
    pub repo: String,
    pub filename: String,
}

impl HfLoader {
    pub fn new(repo: &str, filename: &str) -> Self {
        Self {
            repo: repo.into(),
            filename: filename.into(),
        }
    }

    pub fn load(&self) -> Result<PathBuf> {
        let hf_api = HfApi::new()?;
        let hf_repo = hf_api.repo(Repo::new(self.repo.clone(), RepoType::Model));

        // Concurrent downloads of the same repo race on the hub cache lock.
        let mut attempt = 0;
        loop {
            match hf_repo.get(&self.filename) {
                Ok(path) => return Ok(path),
                Err(e)
                    if e.to_string().contains("Lock acquisition failed")
                        && attempt + 1 < MAX_RETRIES =>
                {
                    let wait = std::time::Duration::from_millis(100 * (1 << attempt));
                    tracing::debug!(repo = %self.repo, file = %self.filename, ?wait, "hub cache locked, retrying");
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenizerLoader {
    pub tokenizer_file_loader: HfLoader,
}

impl TokenizerLoader {
    pub fn new(repo: &str) -> Self {
        Self {
            tokenizer_file_loader: HfLoader::new(repo, "tokenizer.json"),
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.tokenizer_file_loader.load()?;
        Tokenizer::from_file(&path).map_err(|e| {
            AgentError::Tokenization(format!(
                "failed to load tokenizer from {}: {e}",
                path.display()
            ))
        })
    }
}

/// Weight file formats a classifier repository may ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    Safetensors,
    Pytorch,
}

impl WeightsFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("safetensors") => Ok(WeightsFormat::Safetensors),
            Some("bin") => Ok(WeightsFormat::Pytorch),
            _ => Err(AgentError::ModelFormat(format!(
                "unsupported weight file format: {}",
                path.display()
            ))),
        }
    }
}

/// Local paths to everything needed to build a sequence classifier.
#[derive(Debug, Clone)]
pub struct ClassifierFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub format: WeightsFormat,
}

#[derive(Debug, Clone)]
pub struct ClassifierFilesLoader {
    pub repo: String,
}

impl ClassifierFilesLoader {
    pub fn new(repo: &str) -> Self {
        Self { repo: repo.into() }
    }

    /// Fetch `config.json` and the weights, preferring `model.safetensors`
    /// over `pytorch_model.bin`.
    pub fn load(&self) -> Result<ClassifierFiles> {
        let config = HfLoader::new(&self.repo, "config.json")
            .load()
            .map_err(|e| AgentError::ModelNotFound(format!("{}: {e}", self.repo)))?;

        let weights = match HfLoader::new(&self.repo, "model.safetensors").load() {
            Ok(path) => path,
            Err(_) => HfLoader::new(&self.repo, "pytorch_model.bin")
                .load()
                .map_err(|e| {
                    AgentError::ModelNotFound(format!(
                        "weights not found in repo {}. Expected `model.safetensors` or `pytorch_model.bin`: {e}",
                        self.repo
                    ))
                })?,
        };
        let format = WeightsFormat::from_path(&weights)?;

        Ok(ClassifierFiles {
            config,
            weights,
            format,
        })
    }
}
