//! Backend-agnostic index operations: upsert, delete, list, similarity query.

use std::collections::HashMap;
use std::sync::Arc;

use ragdex_llm::{AnyEmbedder, EmbeddingProvider};
use ragdex_memory::{
    FieldCondition, FieldValue, Payload, ScoreKind, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError, open_store,
};
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::chunker::{ChunkOptions, chunk_document};
use crate::config::RagConfig;
use crate::error::{IndexError, Result};
use crate::languages::detect_language;
use crate::loader::Document;

/// Payload key holding the item text.
const CONTENT_KEY: &str = "content";

/// Deterministic id of the `index`-th chunk of `file_path`.
#[must_use]
pub fn chunk_id(file_path: &str, index: usize) -> String {
    format!("{file_path}#chunk-{index}")
}

/// Whether `id` was produced by [`chunk_id`] for `file_path`.
#[must_use]
pub fn is_chunk_of(id: &str, file_path: &str) -> bool {
    id.strip_prefix(file_path)
        .and_then(|rest| rest.strip_prefix("#chunk-"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedItem {
    pub id: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub content: String,
    pub metadata: Payload,
    /// Similarity, 1.0 for identical vectors.
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    pub backend: &'static str,
    pub collection: String,
    pub embedding_provider: String,
    pub item_count: u64,
}

/// Owns the vector store and embedder selected by a [`RagConfig`].
pub struct IndexManager {
    store: Arc<dyn VectorStore>,
    embedder: AnyEmbedder,
    collection: String,
    ready: OnceCell<()>,
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("backend", &self.store.backend_name())
            .field("collection", &self.collection)
            .field("embedder", &self.embedder.name())
            .finish_non_exhaustive()
    }
}

/// Reduce metadata to values every backend can store and filter on.
///
/// Nested values are serialized to JSON strings; nulls are dropped.
#[must_use]
pub fn flatten_metadata(metadata: Payload) -> Payload {
    metadata
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Some((k, serde_json::Value::String(v.to_string())))
            }
            scalar => Some((k, scalar)),
        })
        .collect()
}

fn filter_from_criteria(criteria: &HashMap<String, serde_json::Value>) -> Option<VectorFilter> {
    let mut filter = VectorFilter::default();
    for (field, value) in criteria {
        filter = filter.must_eq(field.clone(), FieldValue::from_json(value)?);
    }
    Some(filter)
}

impl IndexManager {
    /// Validate `config` and open its backends.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] for invalid backend or embedding settings, or
    /// when the vector store cannot be reached.
    pub async fn new(config: &RagConfig) -> Result<Self> {
        let store = open_store(&config.vector_store).map_err(|e| IndexError::Config(e.to_string()))?;
        let embedder = AnyEmbedder::from_config(&config.embedding)
            .map_err(|e| IndexError::Config(e.to_string()))?;
        let manager = Self::with_parts(store, embedder, config.vector_store.collection());
        let exists = manager
            .store
            .collection_exists(&manager.collection)
            .await
            .map_err(|e| IndexError::Config(format!("vector store unreachable: {e}")))?;
        if exists {
            let _ = manager.ready.set(());
        }
        tracing::info!(
            backend = manager.store.backend_name(),
            collection = %manager.collection,
            embedder = manager.embedder.name(),
            "index manager ready"
        );
        Ok(manager)
    }

    /// Assemble a manager from already-built parts.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn VectorStore>,
        embedder: AnyEmbedder,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            ready: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn embedder(&self) -> &AnyEmbedder {
        &self.embedder
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                self.store
                    .ensure_collection(&self.collection, dimension as u64)
                    .await
                    .map_err(IndexError::upsert)
            })
            .await?;
        Ok(())
    }

    /// Whether the collection exists; queries against a missing one are empty.
    async fn has_collection(&self, on_err: fn(VectorStoreError) -> IndexError) -> Result<bool> {
        if self.ready.initialized() {
            return Ok(true);
        }
        self.store
            .collection_exists(&self.collection)
            .await
            .map_err(on_err)
    }

    /// Insert or overwrite items by id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Upsert`] on backend failure or inconsistent vectors.
    pub async fn upsert_items(&self, items: Vec<IndexedItem>) -> Result<()> {
        let Some(first) = items.first() else {
            return Ok(());
        };
        let dimension = first.vector.len();
        if dimension == 0 || items.iter().any(|i| i.vector.len() != dimension) {
            return Err(IndexError::Upsert(
                "all vectors in a batch must share one non-zero dimension".into(),
            ));
        }
        if let Some(item) = items.iter().find(|i| i.metadata.contains_key(CONTENT_KEY)) {
            return Err(reserved_key(&item.id));
        }
        self.ensure_collection(dimension).await?;

        let count = items.len();
        let points = items
            .into_iter()
            .map(|item| {
                let mut payload = flatten_metadata(item.metadata);
                payload.insert(CONTENT_KEY.into(), item.content.into());
                VectorPoint {
                    id: item.id,
                    vector: item.vector,
                    payload,
                }
            })
            .collect();
        self.store
            .upsert(&self.collection, points)
            .await
            .map_err(IndexError::upsert)?;
        tracing::debug!(count, "upserted items");
        Ok(())
    }

    /// Delete items by id; unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Delete`] on backend failure.
    pub async fn delete_items(&self, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() || !self.has_collection(IndexError::delete).await? {
            return Ok(());
        }
        let count = ids.len();
        self.store
            .delete_by_ids(&self.collection, ids)
            .await
            .map_err(IndexError::delete)?;
        tracing::debug!(count, "deleted items");
        Ok(())
    }

    /// Delete every item whose metadata equals all `criteria` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Delete`] for empty criteria, non-scalar criteria values
    /// or backend failure.
    pub async fn delete_where(&self, criteria: &HashMap<String, serde_json::Value>) -> Result<()> {
        if criteria.is_empty() {
            return Err(IndexError::Delete("delete criteria must not be empty".into()));
        }
        let filter = filter_from_criteria(criteria).ok_or_else(|| {
            IndexError::Delete("criteria values must be strings, integers or booleans".into())
        })?;
        self.delete_filtered(filter).await
    }

    async fn delete_filtered(&self, filter: VectorFilter) -> Result<()> {
        if !self.has_collection(IndexError::delete).await? {
            return Ok(());
        }
        self.store
            .delete_by_filter(&self.collection, filter)
            .await
            .map_err(IndexError::delete)
    }

    /// Delete chunks of `file_path` whose `chunk_index` is `keep` or above.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Delete`] on backend failure.
    pub async fn prune_file(&self, file_path: &str, keep: usize) -> Result<()> {
        let must_not = (0..keep)
            .map(|i| FieldCondition {
                field: "chunk_index".into(),
                value: FieldValue::Integer(i64::try_from(i).unwrap_or(i64::MAX)),
            })
            .collect();
        let filter = VectorFilter {
            must: vec![FieldCondition {
                field: "file_path".into(),
                value: FieldValue::Text(file_path.to_owned()),
            }],
            must_not,
        };
        self.delete_filtered(filter).await
    }

    /// Delete every item of every file below the workspace directory `dir`.
    /// Returns the number of items deleted.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::List`] or [`IndexError::Delete`] on backend failure.
    pub async fn delete_under(&self, dir: &str) -> Result<usize> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let doomed: Vec<String> = self
            .get_all_ids()
            .await?
            .into_iter()
            .filter(|id| id.starts_with(&prefix))
            .collect();
        let count = doomed.len();
        self.delete_items(doomed).await?;
        Ok(count)
    }

    /// Every stored id, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::List`] on backend failure.
    pub async fn get_all_ids(&self) -> Result<Vec<String>> {
        if !self.has_collection(IndexError::list).await? {
            return Ok(Vec::new());
        }
        self.store
            .list_ids(&self.collection)
            .await
            .map_err(IndexError::list)
    }

    /// Up to `top_k` items most similar to `vector`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] for non-scalar filter values or backend failure.
    pub async fn query_index(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        filter: Option<&HashMap<String, serde_json::Value>>,
    ) -> Result<Vec<QueryResult>> {
        if top_k == 0 || !self.has_collection(IndexError::query).await? {
            return Ok(Vec::new());
        }
        let filter = match filter {
            Some(criteria) if !criteria.is_empty() => Some(filter_from_criteria(criteria).ok_or_else(
                || IndexError::Query("filter values must be strings, integers or booleans".into()),
            )?),
            _ => None,
        };
        let kind = self.store.score_kind();
        let mut results: Vec<QueryResult> = self
            .store
            .search(&self.collection, vector, top_k as u64, filter)
            .await
            .map_err(IndexError::query)?
            .into_iter()
            .map(|p| to_query_result(p, kind))
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    /// Embed `text` and run [`Self::query_index`] with the result.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] when the embedder fails, otherwise as
    /// [`Self::query_index`].
    pub async fn query_text(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&HashMap<String, serde_json::Value>>,
    ) -> Result<Vec<QueryResult>> {
        let vector = self.embedder.embed(text).await?;
        self.query_index(vector, top_k, filter).await
    }

    /// Number of stored items.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] on backend failure.
    pub async fn count(&self) -> Result<u64> {
        if !self.has_collection(IndexError::query).await? {
            return Ok(0);
        }
        self.store
            .count(&self.collection)
            .await
            .map_err(IndexError::query)
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Query`] when the item count cannot be read.
    pub async fn status(&self) -> Result<IndexStatus> {
        Ok(IndexStatus {
            backend: self.store.backend_name(),
            collection: self.collection.clone(),
            embedding_provider: self.embedder.name().to_owned(),
            item_count: self.count().await?,
        })
    }

    /// Chunk, embed and upsert one document. Returns the ids written, in chunk order.
    ///
    /// Does not remove chunks left over from a longer previous version; see
    /// [`Self::prune_file`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] when embedding fails and
    /// [`IndexError::Upsert`] when the store rejects the items.
    pub async fn index_document(
        &self,
        document: &Document,
        options: &ChunkOptions,
    ) -> Result<Vec<String>> {
        if document.metadata.contains_key(CONTENT_KEY) {
            return Err(reserved_key(&document.id));
        }
        let language = detect_language(std::path::Path::new(&document.id));
        let chunks = chunk_document(&document.content, language, options, &document.metadata);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        ragdex_llm::provider::ensure_batch_len(texts.len(), vectors.len())?;

        let items: Vec<IndexedItem> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, vector))| IndexedItem {
                id: chunk_id(&document.id, i),
                metadata: chunk.to_metadata(i),
                content: chunk.content,
                vector,
            })
            .collect();
        let ids = items.iter().map(|i| i.id.clone()).collect();
        self.upsert_items(items).await?;
        tracing::debug!(file = %document.id, "indexed document");
        Ok(ids)
    }
}

/// The chunk text lives under [`CONTENT_KEY`] in the payload, so callers cannot use it.
fn reserved_key(id: &str) -> IndexError {
    IndexError::Other(format!(
        "metadata key {CONTENT_KEY:?} is reserved for chunk text (item {id})"
    ))
}

fn to_query_result(point: ScoredVectorPoint, kind: ScoreKind) -> QueryResult {
    let mut metadata = point.payload;
    let content = match metadata.remove(CONTENT_KEY) {
        Some(serde_json::Value::String(s)) => s,
        _ => String::new(),
    };
    let score = match kind {
        ScoreKind::Similarity => point.score,
        ScoreKind::Distance => 1.0 - point.score,
    };
    QueryResult {
        id: point.id,
        content,
        metadata,
        score,
    }
}
