use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Embedding backend selection, tagged by `provider`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbeddingConfig {
    Mock(MockEmbeddingConfig),
    Ollama(OllamaEmbeddingConfig),
    Http(HttpEmbeddingConfig),
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::Mock(MockEmbeddingConfig::default())
    }
}

impl EmbeddingConfig {
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Mock(_) => "mock",
            Self::Ollama(_) => "ollama",
            Self::Http(_) => "http",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MockEmbeddingConfig {
    #[serde(default = "default_mock_dimension")]
    pub dimension: usize,
    /// Every call fails; exercises error paths end to end.
    #[serde(default)]
    pub fail: bool,
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for MockEmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_mock_dimension(),
            fail: false,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OllamaEmbeddingConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_ollama_batch_size")]
    pub batch_size: usize,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_ollama_model(),
            batch_size: default_ollama_batch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpEmbeddingConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_http_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_http_max_concurrency")]
    pub max_concurrency: usize,
}

impl HttpEmbeddingConfig {
    /// Endpoint with default batching and no extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            model: None,
            batch_size: default_http_batch_size(),
            max_concurrency: default_http_max_concurrency(),
        }
    }
}

fn default_mock_dimension() -> usize {
    384
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

fn default_ollama_model() -> String {
    "nomic-embed-text".into()
}

fn default_ollama_batch_size() -> usize {
    32
}

fn default_http_batch_size() -> usize {
    64
}

fn default_http_max_concurrency() -> usize {
    4
}
