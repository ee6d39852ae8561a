use std::path::PathBuf;
use std::str::FromStr;

use ragdex_llm::EmbeddingConfig;
use ragdex_llm::config::{HttpEmbeddingConfig, MockEmbeddingConfig, OllamaEmbeddingConfig};
use ragdex_memory::{MemoryStoreConfig, QdrantConfig, VectorStoreConfig};

use super::Config;

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RAGDEX_WORKSPACE") {
            self.workspace = PathBuf::from(v);
        }
        self.apply_env_overrides_vector_store();
        self.apply_env_overrides_embedding();

        if let Some(enabled) = parsed::<bool>("RAGDEX_AUTO_WATCH") {
            self.rag.sync.auto_watch = enabled;
        }
        if let Some(ms) = parsed::<u64>("RAGDEX_DEBOUNCE_MS") {
            self.rag.sync.debounce_ms = ms;
        }
        if let Some(size) = parsed::<usize>("RAGDEX_MAX_CHUNK_SIZE") {
            self.rag.chunking.max_chunk_size = size;
        }
        if let Some(overlap) = parsed::<usize>("RAGDEX_CHUNK_OVERLAP") {
            self.rag.chunking.chunk_overlap = overlap;
        }
    }

    fn apply_env_overrides_vector_store(&mut self) {
        if let Ok(v) = std::env::var("RAGDEX_VECTOR_BACKEND") {
            let collection = self.rag.vector_store.collection().to_owned();
            let current = self.rag.vector_store.backend_name();
            match v.as_str() {
                b if b == current => {}
                "memory" => {
                    self.rag.vector_store =
                        VectorStoreConfig::Memory(MemoryStoreConfig { collection });
                }
                "qdrant" => {
                    self.rag.vector_store = VectorStoreConfig::Qdrant(QdrantConfig {
                        collection,
                        ..QdrantConfig::default()
                    });
                }
                _ => tracing::warn!("ignoring invalid RAGDEX_VECTOR_BACKEND value: {v}"),
            }
        }

        let url = std::env::var("RAGDEX_QDRANT_URL").ok();
        let api_key = std::env::var("RAGDEX_QDRANT_API_KEY").ok();
        match &mut self.rag.vector_store {
            VectorStoreConfig::Qdrant(qdrant) => {
                if let Some(url) = url {
                    qdrant.url = url;
                }
                if let Some(key) = api_key {
                    qdrant.api_key = Some(key);
                }
            }
            VectorStoreConfig::Memory(_) => {
                if url.is_some() || api_key.is_some() {
                    tracing::warn!("ignoring RAGDEX_QDRANT_* overrides: vector backend is memory");
                }
            }
        }
    }

    fn apply_env_overrides_embedding(&mut self) {
        let url = std::env::var("RAGDEX_EMBEDDING_URL").ok();
        let model = std::env::var("RAGDEX_EMBEDDING_MODEL").ok();

        if let Ok(v) = std::env::var("RAGDEX_EMBEDDING_PROVIDER") {
            let current = self.rag.embedding.provider_name();
            match v.as_str() {
                p if p == current => {}
                "mock" => {
                    self.rag.embedding = EmbeddingConfig::Mock(MockEmbeddingConfig::default());
                }
                "ollama" => {
                    self.rag.embedding = EmbeddingConfig::Ollama(OllamaEmbeddingConfig::default());
                }
                "http" => match &url {
                    Some(url) => {
                        self.rag.embedding = EmbeddingConfig::Http(HttpEmbeddingConfig::new(url));
                    }
                    None => tracing::warn!(
                        "ignoring RAGDEX_EMBEDDING_PROVIDER=http without RAGDEX_EMBEDDING_URL"
                    ),
                },
                _ => tracing::warn!("ignoring invalid RAGDEX_EMBEDDING_PROVIDER value: {v}"),
            }
        }

        match &mut self.rag.embedding {
            EmbeddingConfig::Ollama(ollama) => {
                if let Some(url) = url {
                    ollama.base_url = url;
                }
                if let Some(model) = model {
                    ollama.model = model;
                }
            }
            EmbeddingConfig::Http(http) => {
                if let Some(url) = url {
                    http.url = url;
                }
                if let Some(model) = model {
                    http.model = Some(model);
                }
            }
            EmbeddingConfig::Mock(_) => {}
        }
    }
}
