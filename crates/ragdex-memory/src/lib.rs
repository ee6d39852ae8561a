//! Vector storage backends behind a single [`VectorStore`] trait.
//!
//! [`InMemoryVectorStore`] keeps points in process and scores by brute-force
//! cosine similarity; [`QdrantOps`] talks to a Qdrant server over gRPC.

pub mod config;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use config::{MemoryStoreConfig, QdrantConfig, QdrantDistance, VectorStoreConfig, open_store};
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    FieldCondition, FieldValue, Payload, ScoreKind, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};
