//! Generic remote embedding endpoint speaking a minimal JSON protocol.

use std::fmt;

use futures::future::try_join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::HttpEmbeddingConfig;
use crate::error::LlmError;
use crate::provider::{EmbeddingProvider, ensure_batch_len};

#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    model: Option<String>,
    batch_size: usize,
    max_concurrency: usize,
}

impl fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.keys().map(HeaderName::as_str).collect();
        f.debug_struct("HttpEmbedder")
            .field("client", &"<reqwest::Client>")
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Accepted response shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingData> },
    List(Vec<EmbeddingData>),
}

impl EmbeddingResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            Self::Embeddings { embeddings } => embeddings,
            Self::Data { data: items } | Self::List(items) => {
                items.into_iter().map(|d| d.embedding).collect()
            }
        }
    }
}

impl HttpEmbedder {
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the URL is empty or a header is not a
    /// valid HTTP header, or [`LlmError::Http`] if the client cannot be built.
    pub fn new(config: &HttpEmbeddingConfig) -> Result<Self, LlmError> {
        if config.url.trim().is_empty() {
            return Err(LlmError::Config("http embedding url must not be empty".into()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| LlmError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| LlmError::Config(format!("invalid value for header {name}: {e}")))?;
            headers.insert(name, value);
        }

        Ok(Self {
            client: crate::http::default_client()?,
            url: config.url.clone(),
            headers,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn post_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = EmbeddingRequest {
            input: batch,
            model: self.model.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(url = %self.url, "embedding endpoint error {status}: {text}");
            return Err(LlmError::Status {
                provider: "http".into(),
                status: status.as_u16(),
                body: text,
            });
        }

        let vectors = serde_json::from_str::<EmbeddingResponse>(&text)?.into_vectors();
        ensure_batch_len(batch.len(), vectors.len())?;
        Ok(vectors)
    }
}

impl EmbeddingProvider for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // At most `max_concurrency` requests in flight; `try_join_all` keeps
        // results in submission order.
        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for group in batches.chunks(self.max_concurrency) {
            let results = try_join_all(group.iter().map(|batch| self.post_batch(batch))).await?;
            vectors.extend(results.into_iter().flatten());
        }
        Ok(vectors)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "http"
    }
}
