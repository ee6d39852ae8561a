//! Embedding provider abstraction and backend implementations.

pub mod any;
pub mod config;
pub mod error;
pub(crate) mod http;
pub mod mock;
pub mod ollama;
pub mod provider;
pub mod remote;

pub use any::AnyEmbedder;
pub use config::EmbeddingConfig;
pub use error::LlmError;
pub use provider::EmbeddingProvider;
