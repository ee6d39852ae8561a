use std::path::PathBuf;

use ragdex_index::{ChunkingConfig, RagConfig, RagServiceConfig, SyncConfig};
use ragdex_llm::EmbeddingConfig;
use ragdex_memory::VectorStoreConfig;
use serde::{Deserialize, Serialize};

/// Top-level `ragdex.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    #[serde(default)]
    pub rag: RagSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            rag: RagSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RagSection {
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    #[must_use]
    pub fn rag_config(&self) -> RagConfig {
        RagConfig {
            vector_store: self.rag.vector_store.clone(),
            embedding: self.rag.embedding.clone(),
        }
    }

    #[must_use]
    pub fn service_config(&self) -> RagServiceConfig {
        RagServiceConfig {
            workspace_root: self.workspace.clone(),
            rag: self.rag_config(),
            sync: self.rag.sync.clone(),
            chunking: self.rag.chunking,
        }
    }
}
