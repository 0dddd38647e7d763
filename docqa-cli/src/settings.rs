//! Settings file loading and API key resolution.

use std::path::Path;

use anyhow::{Context, Result, bail};
use docqa_rag::RagConfig;
use serde::Deserialize;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// The `[openai]` table of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub chat_model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    openai: OpenAiSettings,
}

/// Everything the CLI needs to build the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub rag: RagConfig,
    pub openai: OpenAiSettings,
}

impl Settings {
    /// Parse settings from TOML. Pipeline keys sit at the top level.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let rag = RagConfig::from_toml_str(text)?;
        let file: SettingsFile = toml::from_str(text).context("invalid [openai] table")?;
        Ok(Self { rag, openai: file.openai })
    }

    /// Load settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Replace the corpus directory and revalidate.
    pub fn override_doc_dir(&mut self, doc_dir: Option<String>) -> Result<()> {
        if let Some(doc_dir) = doc_dir {
            self.rag.doc_dir = doc_dir;
            self.rag.validate()?;
        }
        Ok(())
    }

    /// The API key from the settings file, else from `env_value`.
    pub fn api_key(&self, env_value: Option<String>) -> Result<String> {
        let key = self
            .openai
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or(env_value.filter(|key| !key.trim().is_empty()));
        match key {
            Some(key) => Ok(key),
            None => bail!("no API key: set [openai] api_key in the config file or {API_KEY_ENV}"),
        }
    }
}
