use std::future::Future;

use crate::error::LlmError;

/// A backend that turns text into fixed-dimension vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    ///
    /// The output has exactly one vector per input, in input order. An empty
    /// input yields an empty output without contacting the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or returns a different number of
    /// vectors than it was sent.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or returns no vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send {
        let texts = vec![text.to_owned()];
        async move {
            let mut vectors = self.embed_batch(&texts).await?;
            vectors.pop().ok_or_else(|| LlmError::EmptyResponse {
                provider: self.name().to_owned(),
            })
        }
    }

    /// Number of texts sent to the backend per request.
    fn batch_size(&self) -> usize;

    fn name(&self) -> &str;
}

/// Reject a backend response whose length differs from the request.
///
/// # Errors
///
/// Returns [`LlmError::BatchMismatch`] when `actual != expected`.
pub fn ensure_batch_len(expected: usize, actual: usize) -> Result<(), LlmError> {
    if expected == actual {
        Ok(())
    } else {
        Err(LlmError::BatchMismatch { expected, actual })
    }
}
