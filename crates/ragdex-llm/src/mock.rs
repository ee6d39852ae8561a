//! Deterministic embedder for tests and as a zero-setup default.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::EmbeddingProvider;

/// Returns the same unit vector for every input.
///
/// Vectors do not depend on content, so every indexed item ties with every
/// other on similarity. That is enough to exercise the pipeline without a model.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
    pub fail: bool,
    /// Milliseconds to sleep before returning.
    pub delay_ms: u64,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            delay_ms: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of `embed_batch` calls that reached the backend (non-empty input).
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn vector(&self) -> Vec<f32> {
        #[allow(clippy::cast_precision_loss)]
        let component = 1.0 / (self.dimension.max(1) as f32).sqrt();
        vec![component; self.dimension]
    }
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(texts.iter().map(|_| self.vector()).collect())
    }

    fn batch_size(&self) -> usize {
        usize::MAX
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
