use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::config::OllamaEmbeddingConfig;
use crate::error::LlmError;
use crate::provider::{EmbeddingProvider, ensure_batch_len};

/// Local Ollama model endpoint. Sends one `/api/embed` request per batch.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
    batch_size: usize,
}

impl OllamaEmbedder {
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if `base_url` is not a valid URL.
    pub fn new(base_url: &str, model: String, batch_size: usize) -> Result<Self, LlmError> {
        let (host, port) = parse_host_port(base_url);
        let url = format!("{host}:{port}");
        let client = Ollama::try_new(url.as_str())
            .map_err(|e| LlmError::Config(format!("invalid ollama url {url:?}: {e}")))?;
        Ok(Self {
            client,
            model,
            batch_size: batch_size.max(1),
        })
    }

    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn from_config(config: &OllamaEmbeddingConfig) -> Result<Self, LlmError> {
        Self::new(&config.base_url, config.model.clone(), config.batch_size)
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_one_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            EmbeddingsInput::Multiple(batch.to_vec()),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| LlmError::Other(format!("Ollama embedding request failed: {e}")))?;

        ensure_batch_len(batch.len(), response.embeddings.len())?;
        Ok(response.embeddings)
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_one_batch(batch).await?);
        }
        tracing::debug!(
            model = %self.model,
            texts = texts.len(),
            batches = texts.len().div_ceil(self.batch_size),
            "ollama embeddings generated"
        );
        Ok(vectors)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), 11434)
}
