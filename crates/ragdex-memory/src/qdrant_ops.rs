//! Qdrant-backed [`VectorStore`].
//!
//! Qdrant only accepts unsigned integers or UUIDs as point ids, so every
//! string id is mapped to a deterministic UUIDv5 and the original id is kept
//! in the [`POINT_KEY`] payload field.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, PointId, PointStruct, PointsIdsList, ScoredPoint, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder, point_id::PointIdOptions,
    value::Kind,
};
use uuid::Uuid;

use crate::config::QdrantDistance;
use crate::vector_store::{
    BoxFuture, FieldCondition, FieldValue, Payload, ScoreKind, ScoredVectorPoint, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Payload field holding the caller-facing string id of a point.
pub const POINT_KEY: &str = "point_key";

const SCROLL_PAGE: u32 = 256;

/// Thin wrapper over [`Qdrant`] client encapsulating collection operations.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
    distance: QdrantDistance,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps")
            .field("distance", &self.distance)
            .finish_non_exhaustive()
    }
}

/// Deterministic Qdrant point id for a string key.
#[must_use]
pub fn point_uuid(key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

impl QdrantOps {
    /// Create a new `QdrantOps` connected to the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str, api_key: Option<&str>) -> QdrantResult<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_owned());
        }
        let client = builder.build().map_err(Box::new)?;
        Ok(Self {
            client,
            distance: QdrantDistance::Cosine,
        })
    }

    #[must_use]
    pub fn with_distance(mut self, distance: QdrantDistance) -> Self {
        self.distance = distance;
        self
    }

    /// Access the underlying Qdrant client for advanced operations.
    #[must_use]
    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    fn qdrant_distance(&self) -> Distance {
        match self.distance {
            QdrantDistance::Cosine => Distance::Cosine,
            QdrantDistance::Dot => Distance::Dot,
            QdrantDistance::Euclid => Distance::Euclid,
            QdrantDistance::Manhattan => Distance::Manhattan,
        }
    }

    /// Ensure a collection exists with the configured distance.
    ///
    /// Idempotent: no-op if the collection already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached or collection creation fails.
    pub async fn create_if_missing(&self, collection: &str, vector_size: u64) -> QdrantResult<()> {
        if self
            .client
            .collection_exists(collection)
            .await
            .map_err(Box::new)?
        {
            return Ok(());
        }
        tracing::info!(collection, vector_size, "creating qdrant collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, self.qdrant_distance())),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Search for similar vectors, returning scored points with payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn search_raw(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<Filter>,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    /// Scroll every point and collect the string ids stored under [`POINT_KEY`].
    ///
    /// # Errors
    ///
    /// Returns an error if the scroll operation fails.
    pub async fn scroll_keys(&self, collection: &str) -> QdrantResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .with_payload(true)
                .with_vectors(false)
                .limit(SCROLL_PAGE);

            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self.client.scroll(builder).await.map_err(Box::new)?;

            for point in &response.result {
                match point.payload.get(POINT_KEY).and_then(|v| v.kind.as_ref()) {
                    Some(Kind::StringValue(key)) => keys.push(key.clone()),
                    _ => {
                        if let Some(id) = point.id.clone().and_then(point_id_string) {
                            keys.push(id);
                        }
                    }
                }
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }
}

fn to_point_struct(point: VectorPoint) -> Result<PointStruct, VectorStoreError> {
    let mut object: serde_json::Map<String, serde_json::Value> =
        point.payload.into_iter().collect();
    object.insert(POINT_KEY.into(), serde_json::Value::String(point.id.clone()));
    let payload: HashMap<String, qdrant_client::qdrant::Value> =
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    Ok(PointStruct::new(point_uuid(&point.id), point.vector, payload))
}

impl VectorStore for QdrantOps {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.create_if_missing(&collection, vector_size)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if points.is_empty() {
                return Ok(());
            }
            let qdrant_points = points
                .into_iter()
                .map(to_point_struct)
                .collect::<Result<Vec<_>, _>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, qdrant_points).wait(true))
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
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
            let qdrant_filter = filter.filter(|f| !f.is_empty()).map(vector_filter_to_qdrant);
            let results = self
                .search_raw(&collection, vector, limit, qdrant_filter)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(results.into_iter().map(scored_point_to_vector).collect())
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
            let point_ids: Vec<PointId> = ids
                .iter()
                .map(|id| PointId::from(point_uuid(id)))
                .collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(PointsIdsList { ids: point_ids })
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
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
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(vector_filter_to_qdrant(filter))
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn list_ids(&self, collection: &str) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.scroll_keys(&collection)
                .await
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let response = self
                .client
                .count(CountPointsBuilder::new(&collection).exact(true))
                .await
                .map_err(|e| VectorStoreError::Count(e.to_string()))?;
            Ok(response.result.map_or(0, |r| r.count))
        })
    }

    fn score_kind(&self) -> ScoreKind {
        match self.distance {
            QdrantDistance::Cosine | QdrantDistance::Dot => ScoreKind::Similarity,
            QdrantDistance::Euclid | QdrantDistance::Manhattan => ScoreKind::Distance,
        }
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}

fn vector_filter_to_qdrant(filter: VectorFilter) -> Filter {
    let must: Vec<_> = filter
        .must
        .into_iter()
        .map(field_condition_to_qdrant)
        .collect();
    let must_not: Vec<_> = filter
        .must_not
        .into_iter()
        .map(field_condition_to_qdrant)
        .collect();

    let mut f = Filter::default();
    if !must.is_empty() {
        f.must = must;
    }
    if !must_not.is_empty() {
        f.must_not = must_not;
    }
    f
}

fn field_condition_to_qdrant(cond: FieldCondition) -> Condition {
    let field = if cond.field == "id" {
        POINT_KEY.to_owned()
    } else {
        cond.field
    };
    match cond.value {
        FieldValue::Integer(v) => Condition::matches(field, v),
        FieldValue::Text(v) => Condition::matches(field, v),
        FieldValue::Bool(v) => Condition::matches(field, v),
    }
}

fn point_id_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Uuid(u) => Some(u),
        PointIdOptions::Num(n) => Some(n.to_string()),
    }
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let mut key = None;
    let payload: Payload = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            if k == POINT_KEY {
                key = json_val.as_str().map(str::to_owned);
                return None;
            }
            Some((k, json_val))
        })
        .collect();

    let id = key
        .or_else(|| point.id.and_then(point_id_string))
        .unwrap_or_default();

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid_url() {
        let ops = QdrantOps::new("http://localhost:6334", None);
        assert!(ops.is_ok());
    }

    #[test]
    fn new_with_api_key() {
        let ops = QdrantOps::new("http://localhost:6334", Some("secret"));
        assert!(ops.is_ok());
    }

    #[test]
    fn new_invalid_url() {
        let ops = QdrantOps::new("not a valid url", None);
        assert!(ops.is_err());
    }

    #[test]
    fn debug_format() {
        let ops = QdrantOps::new("http://localhost:6334", None).unwrap();
        let dbg = format!("{ops:?}");
        assert!(dbg.contains("QdrantOps"));
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn point_uuid_is_deterministic() {
        let a = point_uuid("src/lib.rs#chunk-0");
        let b = point_uuid("src/lib.rs#chunk-0");
        let c = point_uuid("src/lib.rs#chunk-1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn point_struct_keeps_original_id() {
        let point = VectorPoint {
            id: "notes.md#chunk-2".into(),
            vector: vec![0.5, 0.5],
            payload: HashMap::from([("language".into(), serde_json::json!("markdown"))]),
        };
        let ps = to_point_struct(point).unwrap();
        let key = ps.payload.get(POINT_KEY).and_then(|v| v.kind.clone());
        assert!(matches!(key, Some(Kind::StringValue(s)) if s == "notes.md#chunk-2"));
        assert!(ps.payload.contains_key("language"));
    }

    #[test]
    fn filter_conversion_maps_id_field() {
        let filter = VectorFilter::default()
            .must_eq("id", FieldValue::Text("a#chunk-0".into()))
            .must_eq("chunk_index", FieldValue::Integer(0));
        let qf = vector_filter_to_qdrant(filter);
        assert_eq!(qf.must.len(), 2);
        assert!(qf.must_not.is_empty());
        let dbg = format!("{:?}", qf.must[0]);
        assert!(dbg.contains(POINT_KEY));
    }

    #[test]
    fn scored_point_uses_point_key_as_id() {
        let mut payload = HashMap::new();
        payload.insert(
            POINT_KEY.to_owned(),
            qdrant_client::qdrant::Value::from("a.rs#chunk-3".to_owned()),
        );
        payload.insert(
            "chunk_index".to_owned(),
            qdrant_client::qdrant::Value::from(3_i64),
        );
        let point = ScoredPoint {
            id: Some(PointId::from(point_uuid("a.rs#chunk-3"))),
            payload,
            score: 0.75,
            ..Default::default()
        };
        let converted = scored_point_to_vector(point);
        assert_eq!(converted.id, "a.rs#chunk-3");
        assert!(!converted.payload.contains_key(POINT_KEY));
        assert_eq!(converted.payload["chunk_index"], serde_json::json!(3));
        assert!((converted.score - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn score_kind_follows_distance() {
        let ops = QdrantOps::new("http://localhost:6334", None).unwrap();
        assert_eq!(ops.score_kind(), ScoreKind::Similarity);
        let ops = ops.with_distance(QdrantDistance::Euclid);
        assert_eq!(ops.score_kind(), ScoreKind::Distance);
        assert_eq!(ops.backend_name(), "qdrant");
    }
}
