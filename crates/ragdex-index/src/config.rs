use std::path::PathBuf;

use ragdex_llm::EmbeddingConfig;
use ragdex_memory::VectorStoreConfig;
use serde::{Deserialize, Serialize};

use crate::chunker::ChunkOptions;
use crate::error::{IndexError, Result};

/// Backend selection for the index manager.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RagConfig {
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub auto_watch: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    /// When non-empty, only files matching one of these globs are indexed.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Files larger than this many bytes are skipped.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_watch: true,
            debounce_ms: default_debounce_ms(),
            respect_gitignore: true,
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    #[must_use]
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            max_chunk_size: self.max_chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// Everything the sync service needs to build its collaborators.
#[derive(Debug, Clone, Default)]
pub struct RagServiceConfig {
    pub workspace_root: PathBuf,
    pub rag: RagConfig,
    pub sync: SyncConfig,
    pub chunking: ChunkingConfig,
}

impl RagServiceConfig {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] when chunking or debounce settings are unusable
    /// or a backend section is incomplete.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chunk_size == 0 {
            return Err(IndexError::Config("max_chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.max_chunk_size {
            return Err(IndexError::Config(format!(
                "chunk_overlap ({}) must be smaller than max_chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.max_chunk_size
            )));
        }
        if self.sync.debounce_ms == 0 {
            return Err(IndexError::Config("debounce_ms must be > 0".into()));
        }
        self.rag
            .vector_store
            .validate()
            .map_err(|e| IndexError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let sync = SyncConfig::default();
        assert!(sync.auto_watch);
        assert_eq!(sync.debounce_ms, 500);
        assert_eq!(sync.max_file_size, 10_485_760);
        let chunking = ChunkingConfig::default();
        assert_eq!(chunking.options(), ChunkOptions::default());
        assert!(RagServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_partial_sync_section() {
        let sync: SyncConfig = toml::from_str(
            r#"
            auto_watch = false
            exclude = ["**/*.log"]
            "#,
        )
        .unwrap();
        assert!(!sync.auto_watch);
        assert!(sync.respect_gitignore);
        assert_eq!(sync.exclude, vec!["**/*.log".to_owned()]);
        assert_eq!(sync.debounce_ms, 500);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let cfg = RagServiceConfig {
            chunking: ChunkingConfig {
                max_chunk_size: 100,
                chunk_overlap: 100,
            },
            ..RagServiceConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(IndexError::Config(_))));
    }

    #[test]
    fn zero_debounce_rejected() {
        let mut cfg = RagServiceConfig::default();
        cfg.sync.debounce_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
