use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("scroll error: {0}")]
    Scroll(String),
    #[error("count error: {0}")]
    Count(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid vector store configuration: {0}")]
    Config(String),
}

pub type Payload = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// Conjunction of equality conditions over payload fields.
///
/// The pseudo-field `id` matches the point id itself.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl VectorFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    #[must_use]
    pub fn must_eq(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.must.push(FieldCondition {
            field: field.into(),
            value,
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    /// Convert a JSON scalar into a filterable value.
    ///
    /// Returns `None` for floats, nulls, arrays and objects.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Self::Integer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// What the `score` of a [`ScoredVectorPoint`] means for a given backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// Higher is more similar.
    Similarity,
    /// Lower is more similar.
    Distance,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Every point id currently stored in `collection`.
    fn list_ids(&self, collection: &str) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Similarity
    }

    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_from_json_scalars() {
        assert_eq!(
            FieldValue::from_json(&serde_json::json!("rust")),
            Some(FieldValue::Text("rust".into()))
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(3)),
            Some(FieldValue::Integer(3))
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(true)),
            Some(FieldValue::Bool(true))
        );
    }

    #[test]
    fn field_value_from_json_rejects_non_scalars() {
        assert!(FieldValue::from_json(&serde_json::json!(1.5)).is_none());
        assert!(FieldValue::from_json(&serde_json::json!(null)).is_none());
        assert!(FieldValue::from_json(&serde_json::json!([1])).is_none());
    }

    #[test]
    fn filter_builder() {
        let f = VectorFilter::default().must_eq("language", FieldValue::Text("go".into()));
        assert!(!f.is_empty());
        assert_eq!(f.must.len(), 1);
        assert!(VectorFilter::default().is_empty());
    }
}
