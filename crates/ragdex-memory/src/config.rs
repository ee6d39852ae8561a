use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::in_memory_store::InMemoryVectorStore;
use crate::qdrant_ops::QdrantOps;
use crate::vector_store::{VectorStore, VectorStoreError};

fn default_collection() -> String {
    "ragdex_chunks".into()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QdrantDistance {
    #[default]
    Cosine,
    Dot,
    Euclid,
    Manhattan,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryStoreConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub distance: QdrantDistance,
    /// Local directory owned by the store; the workspace loader never indexes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
}

impl std::fmt::Debug for QdrantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("collection", &self.collection)
            .field("distance", &self.distance)
            .field("storage_path", &self.storage_path)
            .finish()
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
            collection: default_collection(),
            distance: QdrantDistance::default(),
            storage_path: None,
        }
    }
}

/// Vector store backend selection, tagged by `backend` in TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum VectorStoreConfig {
    Memory(MemoryStoreConfig),
    Qdrant(QdrantConfig),
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryStoreConfig::default())
    }
}

impl VectorStoreConfig {
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Qdrant(_) => "qdrant",
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Memory(c) => &c.collection,
            Self::Qdrant(c) => &c.collection,
        }
    }

    /// Directory the backend keeps on disk, if any.
    #[must_use]
    pub fn storage_dir(&self) -> Option<&PathBuf> {
        match self {
            Self::Memory(_) => None,
            Self::Qdrant(c) => c.storage_path.as_ref(),
        }
    }

    /// Check backend-specific settings without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Config`] on an empty collection name or
    /// a Qdrant URL without an http(s) scheme.
    pub fn validate(&self) -> Result<(), VectorStoreError> {
        if self.collection().trim().is_empty() {
            return Err(VectorStoreError::Config(
                "collection name must not be empty".into(),
            ));
        }
        if let Self::Qdrant(c) = self
            && !(c.url.starts_with("http://") || c.url.starts_with("https://"))
        {
            return Err(VectorStoreError::Config(format!(
                "qdrant url must start with http:// or https://, got {:?}",
                c.url
            )));
        }
        Ok(())
    }
}

/// Validate `config` and construct the selected backend.
///
/// # Errors
///
/// Returns an error if validation fails or the Qdrant client cannot be built.
pub fn open_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    config.validate()?;
    match config {
        VectorStoreConfig::Memory(_) => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorStoreConfig::Qdrant(c) => {
            let ops = QdrantOps::new(&c.url, c.api_key.as_deref())
                .map_err(|e| VectorStoreError::Connection(e.to_string()))?
                .with_distance(c.distance);
            Ok(Arc::new(ops))
        }
    }
}
