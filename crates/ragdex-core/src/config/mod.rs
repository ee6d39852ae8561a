mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;
use ragdex_llm::EmbeddingConfig;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ragdex.toml";

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Check settings that would otherwise fail later at service start.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workspace.as_os_str().is_empty() {
            anyhow::bail!("workspace must not be empty");
        }
        match &self.rag.embedding {
            EmbeddingConfig::Mock(mock) if mock.dimension == 0 => {
                anyhow::bail!("rag.embedding.dimension must be > 0");
            }
            EmbeddingConfig::Ollama(ollama) if ollama.model.trim().is_empty() => {
                anyhow::bail!("rag.embedding.model must not be empty");
            }
            EmbeddingConfig::Http(http) if http.url.trim().is_empty() => {
                anyhow::bail!("rag.embedding.url must not be empty");
            }
            _ => {}
        }
        self.service_config()
            .validate()
            .context("invalid rag configuration")
    }
}
