//! Workspace indexing pipeline for retrieval-augmented generation.
//!
//! Files are loaded from the workspace, split into AST-aware chunks with
//! tree-sitter, embedded, and stored in a vector store. [`IndexSyncService`]
//! keeps the stored items consistent with the files on disk, either by full
//! sync passes or by watching the filesystem.

pub mod chunker;
pub mod config;
pub(crate) mod debounce;
pub mod error;
pub mod ignore_rules;
pub mod languages;
pub mod loader;
pub mod manager;
pub mod splitter;
pub mod sync;
pub mod watcher;

pub use chunker::{Chunk, ChunkOptions, chunk_document};
pub use config::{ChunkingConfig, RagConfig, RagServiceConfig, SyncConfig};
pub use error::{IndexError, Result};
pub use languages::{Lang, detect_language};
pub use loader::{Document, load_document, load_documents, walk_files};
pub use manager::{IndexManager, IndexStatus, IndexedItem, QueryResult, chunk_id};
pub use sync::{FileFailure, IndexSyncService, SyncReport, SyncState};
pub use watcher::{FsEvent, FsEventKind};
