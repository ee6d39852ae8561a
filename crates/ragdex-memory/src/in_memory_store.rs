use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, FieldValue, Payload, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: Payload,
}

struct InMemoryCollection {
    dimension: u64,
    points: HashMap<String, StoredPoint>,
}

/// Process-local vector store. Contents are lost when the process exits.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(id: &str, payload: &Payload, filter: &VectorFilter) -> bool {
    let lookup = |field: &str| -> Option<serde_json::Value> {
        if field == "id" {
            return Some(serde_json::Value::String(id.to_owned()));
        }
        payload.get(field).cloned()
    };
    for cond in &filter.must {
        let Some(val) = lookup(&cond.field) else {
            return false;
        };
        if !field_matches(&val, &cond.value) {
            return false;
        }
    }
    for cond in &filter.must_not {
        if let Some(val) = lookup(&cond.field)
            && field_matches(&val, &cond.value)
        {
            return false;
        }
    }
    true
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
        FieldValue::Bool(b) => val.as_bool() == Some(*b),
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let col = cols
                .entry(collection.clone())
                .or_insert_with(|| InMemoryCollection {
                    dimension: vector_size,
                    points: HashMap::new(),
                });
            if col.dimension != vector_size {
                return Err(VectorStoreError::Collection(format!(
                    "collection {collection} has dimension {}, requested {vector_size}",
                    col.dimension
                )));
            }
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            if let Some(bad) = points
                .iter()
                .find(|p| p.vector.len() as u64 != col.dimension)
            {
                return Err(VectorStoreError::Upsert(format!(
                    "point {} has dimension {}, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    col.dimension
                )));
            }
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;

            let empty_filter = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty_filter);

            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(id, sp)| matches_filter(id, &sp.payload, f))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();

            // ties broken by id so equal-score results come back in a stable order
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Delete(format!("collection {collection} not found"))
            })?;
            for id in &ids {
                col.points.remove(id);
            }
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if filter.is_empty() {
                return Err(VectorStoreError::Delete(
                    "refusing to delete with an empty filter".into(),
                ));
            }
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Delete(format!("collection {collection} not found"))
            })?;
            col.points
                .retain(|id, sp| !matches_filter(id, &sp.payload, &filter));
            Ok(())
        })
    }

    fn list_ids(&self, collection: &str) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Scroll(format!("collection {collection} not found"))
            })?;
            let mut ids: Vec<String> = col.points.keys().cloned().collect();
            ids.sort_unstable();
            Ok(ids)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Count(e.to_string()))?;
            Ok(cols
                .get(&collection)
                .map_or(0, |col| col.points.len() as u64))
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::FieldCondition;

    fn point(id: &str, vector: [f32; 3], payload: &[(&str, serde_json::Value)]) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector: vector.to_vec(),
            payload: payload
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        }
    }

    async fn seeded() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point(
                        "src/a.rs#chunk-0",
                        [1.0, 0.0, 0.0],
                        &[
                            ("file_path", serde_json::json!("src/a.rs")),
                            ("chunk_index", serde_json::json!(0)),
                        ],
                    ),
                    point(
                        "src/a.rs#chunk-1",
                        [0.9, 0.1, 0.0],
                        &[
                            ("file_path", serde_json::json!("src/a.rs")),
                            ("chunk_index", serde_json::json!(1)),
                        ],
                    ),
                    point(
                        "src/b.rs#chunk-0",
                        [0.0, 1.0, 0.0],
                        &[
                            ("file_path", serde_json::json!("src/b.rs")),
                            ("chunk_index", serde_json::json!(0)),
                        ],
                    ),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("test").await.unwrap());
        store.ensure_collection("test", 3).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        store.ensure_collection("test", 3).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_rejects_dimension_change() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        let err = store.ensure_collection("test", 4).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Collection(_)));
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let store = seeded().await;
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "src/a.rs#chunk-0");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
        assert_eq!(results[1].id, "src/a.rs#chunk-1");
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let store = seeded().await;
        store
            .upsert(
                "test",
                vec![point(
                    "src/b.rs#chunk-0",
                    [0.0, 0.0, 1.0],
                    &[("file_path", serde_json::json!("src/b.rs"))],
                )],
            )
            .await
            .unwrap();
        assert_eq!(store.count("test").await.unwrap(), 3);
        let results = store
            .search("test", vec![0.0, 0.0, 1.0], 1, None)
            .await
            .unwrap();
        assert_eq!(results[0].id, "src/b.rs#chunk-0");
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", 3).await.unwrap();
        let err = store
            .upsert(
                "test",
                vec![VectorPoint {
                    id: "x".into(),
                    vector: vec![1.0, 0.0],
                    payload: Payload::new(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Upsert(_)));
    }

    #[tokio::test]
    async fn search_with_filter() {
        let store = seeded().await;
        let filter =
            VectorFilter::default().must_eq("file_path", FieldValue::Text("src/b.rs".into()));
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "src/b.rs#chunk-0");
    }

    #[tokio::test]
    async fn search_with_must_not() {
        let store = seeded().await;
        let filter = VectorFilter {
            must: vec![],
            must_not: vec![FieldCondition {
                field: "chunk_index".into(),
                value: FieldValue::Integer(0),
            }],
        };
        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "src/a.rs#chunk-1");
    }

    #[tokio::test]
    async fn filter_matches_id_field() {
        let store = seeded().await;
        let filter =
            VectorFilter::default().must_eq("id", FieldValue::Text("src/a.rs#chunk-1".into()));
        let results = store
            .search("test", vec![0.0, 1.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "src/a.rs#chunk-1");
    }

    #[tokio::test]
    async fn search_missing_collection_errors() {
        let store = InMemoryVectorStore::new();
        let err = store
            .search("nope", vec![1.0, 0.0, 0.0], 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Search(_)));
    }

    #[tokio::test]
    async fn delete_by_ids_removes_points() {
        let store = seeded().await;
        store
            .delete_by_ids("test", vec!["src/a.rs#chunk-0".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(
            store.list_ids("test").await.unwrap(),
            vec!["src/a.rs#chunk-1".to_owned(), "src/b.rs#chunk-0".to_owned()]
        );
    }

    #[tokio::test]
    async fn delete_by_filter_removes_matching() {
        let store = seeded().await;
        let filter =
            VectorFilter::default().must_eq("file_path", FieldValue::Text("src/a.rs".into()));
        store.delete_by_filter("test", filter).await.unwrap();
        assert_eq!(
            store.list_ids("test").await.unwrap(),
            vec!["src/b.rs#chunk-0".to_owned()]
        );
    }

    #[tokio::test]
    async fn delete_by_filter_rejects_empty_filter() {
        let store = seeded().await;
        let err = store
            .delete_by_filter("test", VectorFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Delete(_)));
        assert_eq!(store.count("test").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn list_ids_sorted() {
        let store = seeded().await;
        let ids = store.list_ids("test").await.unwrap();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn count_missing_collection_is_zero() {
        let store = InMemoryVectorStore::new();
        assert_eq!(store.count("nope").await.unwrap(), 0);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b)).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::new();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("InMemoryVectorStore"));
        assert_eq!(store.backend_name(), "memory");
    }

    fn search_all(vectors: &[[f32; 3]], query: [f32; 3], limit: u64) -> Vec<ScoredVectorPoint> {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let store = InMemoryVectorStore::new();
            store.ensure_collection("prop", 3).await.unwrap();
            let points = vectors
                .iter()
                .enumerate()
                .map(|(i, v)| point(&format!("p{i}"), *v, &[]))
                .collect();
            store.upsert("prop", points).await.unwrap();
            store.search("prop", query.to_vec(), limit, None).await.unwrap()
        })
    }

    proptest::proptest! {
        #[test]
        fn search_is_bounded_and_sorted(
            vectors in proptest::collection::vec(proptest::array::uniform3(-1.0f32..1.0), 0..30),
            query in proptest::array::uniform3(-1.0f32..1.0),
            limit in 0u64..40,
        ) {
            let results = search_all(&vectors, query, limit);
            let expected = vectors.len().min(usize::try_from(limit).unwrap());
            proptest::prop_assert_eq!(results.len(), expected);
            for pair in results.windows(2) {
                proptest::prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
