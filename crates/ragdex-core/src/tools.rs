//! Tool entry points exposed to a protocol adaptor.
//!
//! Every tool returns a [`ToolOutput`]; failures are reported in-band with a
//! suggestion keyed to the phase that failed, never as `Err`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragdex_index::{
    ChunkingConfig, Document, IndexError, IndexManager, IndexStatus, QueryResult, RagConfig,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUGGEST_EMBEDDING: &str =
    "Check the embedding provider configuration (model name, endpoint, API key).";
pub const SUGGEST_BACKEND: &str =
    "Check the vector database configuration and that the service is reachable.";
pub const SUGGEST_FILE: &str =
    "Check that the path exists inside the workspace and is a readable UTF-8 file.";
pub const SUGGEST_INPUT: &str = "Check the tool input and the ragdex configuration.";

/// What a tool needs from its host.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub manager: Arc<IndexManager>,
    pub rag_config: RagConfig,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone)]
pub struct ToolDef {
    pub id: &'static str,
    pub description: &'static str,
    pub schema: schemars::Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Input,
    FileRead,
    Embedding,
    Backend,
}

impl Phase {
    fn suggestion(self) -> &'static str {
        match self {
            Self::Input => SUGGEST_INPUT,
            Self::FileRead => SUGGEST_FILE,
            Self::Embedding => SUGGEST_EMBEDDING,
            Self::Backend => SUGGEST_BACKEND,
        }
    }

    fn of(err: &IndexError) -> Self {
        match err {
            IndexError::Embedding(_) => Self::Embedding,
            IndexError::Io(_) => Self::FileRead,
            e if e.is_backend() => Self::Backend,
            _ => Self::Input,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl<T> ToolOutput<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            suggestion: None,
        }
    }

    fn fail(phase: Phase, error: impl Into<String>) -> Self {
        let error = error.into();
        tracing::warn!(?phase, "tool failed: {error}");
        Self {
            success: false,
            data: None,
            error: Some(error),
            suggestion: Some(phase.suggestion().to_owned()),
        }
    }

    fn from_index_error(err: &IndexError) -> Self {
        Self::fail(Phase::of(err), err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IndexContentInput {
    /// Workspace-relative path of a file to (re)index
    #[serde(default)]
    pub path: Option<String>,
    /// Raw text to index instead of a file; requires `id`
    #[serde(default)]
    pub content: Option<String>,
    /// Identifier for raw content, used like a file path (its extension selects the language)
    #[serde(default)]
    pub id: Option<String>,
    /// Extra metadata stored on every chunk
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexContentResult {
    pub id: String,
    pub chunks: usize,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryIndexInput {
    /// Natural-language or code query
    pub query: String,
    /// Maximum number of results
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Metadata equality filter, e.g. {"file_path": "src/lib.rs"}
    #[serde(default)]
    pub filter: HashMap<String, Value>,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryIndexResult {
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetIndexStatusInput {}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatusResult {
    #[serde(flatten)]
    pub status: IndexStatus,
    pub workspace_root: String,
    pub max_chunk_size: usize,
    pub chunk_overlap: usize,
}

#[must_use]
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            id: "index_content",
            description: "Index a workspace file or a piece of raw text for semantic search",
            schema: schemars::schema_for!(IndexContentInput),
        },
        ToolDef {
            id: "query_index",
            description: "Find indexed chunks most similar to a query",
            schema: schemars::schema_for!(QueryIndexInput),
        },
        ToolDef {
            id: "get_index_status",
            description: "Report the vector backend, embedding provider and item count",
            schema: schemars::schema_for!(GetIndexStatusInput),
        },
    ]
}

/// Resolve `path` inside the workspace. Returns the absolute path and the
/// workspace-relative id with `/` separators.
fn resolve_in_workspace(root: &Path, path: &str) -> Result<(PathBuf, String), String> {
    let root = std::fs::canonicalize(root)
        .map_err(|e| format!("cannot resolve workspace {}: {e}", root.display()))?;
    let abs = std::fs::canonicalize(root.join(path))
        .map_err(|e| format!("cannot resolve {path}: {e}"))?;
    let rel = abs
        .strip_prefix(&root)
        .map_err(|_| format!("{path} is outside the workspace"))?;
    let id = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if id.is_empty() {
        return Err(format!("{path} is not a file"));
    }
    Ok((abs, id))
}

pub async fn index_content(
    ctx: &ToolContext,
    input: IndexContentInput,
) -> ToolOutput<IndexContentResult> {
    if input.metadata.contains_key("content") {
        return ToolOutput::fail(
            Phase::Input,
            "metadata key `content` is reserved for the indexed text",
        );
    }
    let mut document = match (input.path, input.content) {
        (Some(_), Some(_)) => {
            return ToolOutput::fail(Phase::Input, "provide either `path` or `content`, not both");
        }
        (None, None) => {
            return ToolOutput::fail(Phase::Input, "one of `path` or `content` is required");
        }
        (Some(path), None) => {
            let (abs, id) = match resolve_in_workspace(&ctx.workspace_root, &path) {
                Ok(resolved) => resolved,
                Err(e) => return ToolOutput::fail(Phase::FileRead, e),
            };
            match tokio::fs::read_to_string(&abs).await {
                Ok(content) => Document::from_content(id, content),
                Err(e) => {
                    return ToolOutput::fail(Phase::FileRead, format!("cannot read {path}: {e}"));
                }
            }
        }
        (None, Some(content)) => match input.id {
            Some(id) if !id.trim().is_empty() => Document::from_content(id, content),
            _ => return ToolOutput::fail(Phase::Input, "`id` is required with `content`"),
        },
    };
    document.metadata.extend(input.metadata);

    let ids = match ctx
        .manager
        .index_document(&document, &ctx.chunking.options())
        .await
    {
        Ok(ids) => ids,
        Err(e) => return ToolOutput::from_index_error(&e),
    };
    if let Err(e) = ctx.manager.prune_file(&document.id, ids.len()).await {
        return ToolOutput::from_index_error(&e);
    }

    tracing::info!(id = %document.id, chunks = ids.len(), "indexed content");
    ToolOutput::ok(IndexContentResult {
        id: document.id,
        chunks: ids.len(),
        chunk_ids: ids,
    })
}

pub async fn query_index(
    ctx: &ToolContext,
    input: QueryIndexInput,
) -> ToolOutput<QueryIndexResult> {
    if input.query.trim().is_empty() {
        return ToolOutput::fail(Phase::Input, "`query` must not be empty");
    }
    let filter = (!input.filter.is_empty()).then_some(&input.filter);
    match ctx.manager.query_text(&input.query, input.top_k, filter).await {
        Ok(results) => ToolOutput::ok(QueryIndexResult { results }),
        Err(e) => ToolOutput::from_index_error(&e),
    }
}

pub async fn get_index_status(
    ctx: &ToolContext,
    _input: GetIndexStatusInput,
) -> ToolOutput<IndexStatusResult> {
    match ctx.manager.status().await {
        Ok(status) => ToolOutput::ok(IndexStatusResult {
            status,
            workspace_root: ctx.workspace_root.display().to_string(),
            max_chunk_size: ctx.chunking.max_chunk_size,
            chunk_overlap: ctx.chunking.chunk_overlap,
        }),
        Err(e) => ToolOutput::from_index_error(&e),
    }
}

fn to_json<T: Serialize>(output: &ToolOutput<T>) -> Value {
    serde_json::to_value(output).unwrap_or_else(|e| {
        serde_json::json!({
            "success": false,
            "error": format!("failed to serialize tool output: {e}"),
            "suggestion": SUGGEST_INPUT,
        })
    })
}

fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, Value> {
    serde_json::from_value(input).map_err(|e| {
        to_json(&ToolOutput::<()>::fail(
            Phase::Input,
            format!("invalid tool input: {e}"),
        ))
    })
}

/// Dispatch a tool call by id with raw JSON input.
pub async fn call_tool(ctx: &ToolContext, id: &str, input: Value) -> Value {
    match id {
        "index_content" => match parse_input(input) {
            Ok(input) => to_json(&index_content(ctx, input).await),
            Err(out) => out,
        },
        "query_index" => match parse_input(input) {
            Ok(input) => to_json(&query_index(ctx, input).await),
            Err(out) => out,
        },
        "get_index_status" => {
            let input = if input.is_null() {
                Ok(GetIndexStatusInput::default())
            } else {
                parse_input(input)
            };
            match input {
                Ok(input) => to_json(&get_index_status(ctx, input).await),
                Err(out) => out,
            }
        }
        other => to_json(&ToolOutput::<()>::fail(
            Phase::Input,
            format!("unknown tool: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use ragdex_llm::AnyEmbedder;
    use ragdex_llm::mock::MockEmbedder;
    use ragdex_memory::InMemoryVectorStore;

    use super::*;

    fn context(root: &Path, embedder: MockEmbedder) -> ToolContext {
        ToolContext {
            workspace_root: root.to_path_buf(),
            manager: Arc::new(IndexManager::with_parts(
                Arc::new(InMemoryVectorStore::new()),
                AnyEmbedder::Mock(embedder),
                "tools",
            )),
            rag_config: RagConfig::default(),
            chunking: ChunkingConfig::default(),
        }
    }

    #[tokio::test]
    async fn index_file_then_query_and_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn answer() -> u32 {\n    42\n}\n")
            .unwrap();
        let ctx = context(dir.path(), MockEmbedder::new(4));

        let input = serde_json::json!({"path": "src/lib.rs"});
        let out = call_tool(&ctx, "index_content", input).await;
        assert_eq!(out["success"], serde_json::json!(true));
        assert_eq!(out["id"], serde_json::json!("src/lib.rs"));
        assert_eq!(out["chunks"], serde_json::json!(1));
        assert_eq!(out["chunk_ids"], serde_json::json!(["src/lib.rs#chunk-0"]));
        assert!(out.get("error").is_none());

        let out = call_tool(&ctx, "query_index", serde_json::json!({"query": "answer"})).await;
        assert_eq!(out["success"], serde_json::json!(true));
        let results = out["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["metadata"]["language"], serde_json::json!("rust"));

        let out = call_tool(&ctx, "get_index_status", Value::Null).await;
        assert_eq!(out["success"], serde_json::json!(true));
        assert_eq!(out["item_count"], serde_json::json!(1));
        assert_eq!(out["backend"], serde_json::json!("memory"));
    }

    #[tokio::test]
    async fn raw_content_requires_id_and_keeps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), MockEmbedder::new(4));

        let out = index_content(
            &ctx,
            IndexContentInput {
                path: None,
                content: Some("hello".into()),
                id: None,
                metadata: HashMap::new(),
            },
        )
        .await;
        assert!(!out.success);
        assert_eq!(out.suggestion.as_deref(), Some(SUGGEST_INPUT));

        let out = index_content(
            &ctx,
            IndexContentInput {
                path: None,
                content: Some("hello".into()),
                id: Some("notes/greeting.txt".into()),
                metadata: HashMap::from([("source".to_owned(), serde_json::json!("chat"))]),
            },
        )
        .await;
        assert!(out.success);
        let hits = ctx.manager.query_text("hello", 5, None).await.unwrap();
        assert_eq!(hits[0].metadata["source"], serde_json::json!("chat"));
    }

    #[tokio::test]
    async fn reserved_content_metadata_key_is_input_failure() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = MockEmbedder::new(4);
        let ctx = context(dir.path(), embedder.clone());
        let input = serde_json::json!({
            "content": "hello",
            "id": "notes/a.txt",
            "metadata": {"content": "shadow"}
        });
        let out = call_tool(&ctx, "index_content", input).await;
        assert_eq!(out["success"], serde_json::json!(false));
        assert_eq!(out["suggestion"], serde_json::json!(SUGGEST_INPUT));
        assert_eq!(embedder.calls(), 0);
        assert_eq!(ctx.manager.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn path_outside_workspace_is_file_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), MockEmbedder::new(4));
        let input = serde_json::json!({"path": "../../etc/hostname"});
        let out = call_tool(&ctx, "index_content", input).await;
        assert_eq!(out["success"], serde_json::json!(false));
        assert_eq!(out["suggestion"], serde_json::json!(SUGGEST_FILE));
    }

    #[tokio::test]
    async fn missing_file_is_file_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), MockEmbedder::new(4));
        let out = call_tool(&ctx, "index_content", serde_json::json!({"path": "nope.rs"})).await;
        assert_eq!(out["suggestion"], serde_json::json!(SUGGEST_FILE));
    }

    #[tokio::test]
    async fn embedding_failure_suggests_provider_check() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), MockEmbedder::failing(4));
        let out = call_tool(
            &ctx,
            "index_content",
            serde_json::json!({"content": "text", "id": "a.txt"}),
        )
        .await;
        assert_eq!(out["success"], serde_json::json!(false));
        assert_eq!(out["suggestion"], serde_json::json!(SUGGEST_EMBEDDING));

        let out = call_tool(&ctx, "query_index", serde_json::json!({"query": "text"})).await;
        assert_eq!(out["suggestion"], serde_json::json!(SUGGEST_EMBEDDING));
    }

    #[tokio::test]
    async fn invalid_input_and_unknown_tool() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), MockEmbedder::new(4));

        let out = call_tool(&ctx, "query_index", serde_json::json!({"top_k": 3})).await;
        assert_eq!(out["success"], serde_json::json!(false));
        assert_eq!(out["suggestion"], serde_json::json!(SUGGEST_INPUT));

        let out = call_tool(&ctx, "query_index", serde_json::json!({"query": "   "})).await;
        assert_eq!(out["success"], serde_json::json!(false));

        let out = call_tool(&ctx, "drop_index", Value::Null).await;
        assert!(out["error"].as_str().unwrap().contains("unknown tool"));
    }

    #[test]
    fn definitions_cover_all_tools() {
        let defs = tool_definitions();
        let ids: Vec<_> = defs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["index_content", "query_index", "get_index_status"]);
        let query = serde_json::to_value(&defs[1].schema).unwrap();
        assert!(query["properties"]["query"].is_object());
        assert_eq!(query["required"], serde_json::json!(["query"]));
    }
}
