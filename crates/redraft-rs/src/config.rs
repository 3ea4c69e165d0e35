//! On-disk settings for the `redraft` binary.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! [model]
//! model = "google/gemini-2.5-pro"
//! temperature = 0.7
//! refinement_temperature = 0.2
//! max_tokens = 0          # 0 = provider default
//! max_retries = 3
//!
//! [synthesis]
//! max_refinements = 10
//! confidence_threshold = 2
//! language = "English"
//! section_titles = ["Title", "Abstract", "Introduction", "Conclusion"]
//! ```

use crate::agent::config::{DEFAULT_SECTION_TITLES, EngineConfig};
use crate::api::openrouter::{ClientConfig, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Model selection and sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub refinement_temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: client.temperature,
            refinement_temperature: client.refinement_temperature,
            max_tokens: client.max_tokens,
            max_retries: client.retry.max_retries,
        }
    }
}

/// Loop bounds, output language, and the document layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub max_refinements: u32,
    pub confidence_threshold: u32,
    pub language: String,
    pub section_titles: Vec<String>,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            max_refinements: engine.max_refinements,
            confidence_threshold: engine.confidence_threshold,
            language: "English".to_string(),
            section_titles: DEFAULT_SECTION_TITLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub synthesis: SynthesisSettings,
}

impl Settings {
    /// Read and validate a TOML settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine_config().validate().map_err(ConfigError::Invalid)?;
        for (name, t) in [
            ("temperature", self.model.temperature),
            ("refinement_temperature", self.model.refinement_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 0.0 and 2.0, got {t}"
                )));
            }
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_titles(self.synthesis.section_titles.iter().cloned())
            .with_max_refinements(self.synthesis.max_refinements)
            .with_confidence_threshold(self.synthesis.confidence_threshold)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_model(self.model.model.clone())
            .with_temperature(self.model.temperature)
            .with_refinement_temperature(self.model.refinement_temperature)
            .with_max_tokens(self.model.max_tokens)
            .with_retries(self.model.max_retries)
    }
}
