//! Error types for ragdex-index.

use ragdex_memory::VectorStoreError;

/// Errors raised while loading, chunking, embedding or storing documents.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Invalid configuration, detected at construction or `initialize`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding provider failure.
    #[error("embedding failed: {0}")]
    Embedding(#[from] ragdex_llm::LlmError),

    #[error("Upsert failed: {0}")]
    Upsert(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("List failed: {0}")]
    List(String),

    /// IO error reading workspace files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Operation requires `initialize` to have completed.
    #[error("sync service is not initialized")]
    NotInitialized,

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

impl IndexError {
    pub(crate) fn upsert(e: VectorStoreError) -> Self {
        Self::Upsert(e.to_string())
    }

    pub(crate) fn query(e: VectorStoreError) -> Self {
        Self::Query(e.to_string())
    }

    pub(crate) fn delete(e: VectorStoreError) -> Self {
        Self::Delete(e.to_string())
    }

    pub(crate) fn list(e: VectorStoreError) -> Self {
        Self::List(e.to_string())
    }

    /// Whether the failure came from the vector store rather than the document itself.
    #[must_use]
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::Upsert(_) | Self::Query(_) | Self::Delete(_) | Self::List(_)
        )
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
