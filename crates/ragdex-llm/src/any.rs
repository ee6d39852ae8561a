use crate::config::EmbeddingConfig;
use crate::error::LlmError;
use crate::mock::MockEmbedder;
use crate::ollama::OllamaEmbedder;
use crate::provider::EmbeddingProvider;
use crate::remote::HttpEmbedder;

/// Generates a match over all `AnyEmbedder` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_embedder {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyEmbedder::Mock($p) => $expr,
            AnyEmbedder::Ollama($p) => $expr,
            AnyEmbedder::Http($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    Mock(MockEmbedder),
    Ollama(OllamaEmbedder),
    Http(HttpEmbedder),
}

impl AnyEmbedder {
    /// Build the embedder selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when the selected backend's parameters are invalid.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, LlmError> {
        match config {
            EmbeddingConfig::Mock(mock) => {
                if mock.dimension == 0 {
                    return Err(LlmError::Config(
                        "mock embedding dimension must be greater than zero".into(),
                    ));
                }
                let mut embedder = MockEmbedder::new(mock.dimension).with_delay(mock.delay_ms);
                embedder.fail = mock.fail;
                Ok(Self::Mock(embedder))
            }
            EmbeddingConfig::Ollama(ollama) => {
                if ollama.model.trim().is_empty() {
                    return Err(LlmError::Config("ollama embedding model must be set".into()));
                }
                Ok(Self::Ollama(OllamaEmbedder::from_config(ollama)?))
            }
            EmbeddingConfig::Http(http) => Ok(Self::Http(HttpEmbedder::new(http)?)),
        }
    }
}

impl EmbeddingProvider for AnyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        delegate_embedder!(self, |p| p.embed_batch(texts).await)
    }

    fn batch_size(&self) -> usize {
        delegate_embedder!(self, |p| p.batch_size())
    }

    fn name(&self) -> &str {
        delegate_embedder!(self, |p| p.name())
    }
}
