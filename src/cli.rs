use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ragdex", version)]
#[command(about = "Index a workspace for semantic search and keep the index in sync")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to ragdex.toml
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one full sync of the workspace index
    Sync,
    /// Sync, then keep the index updated until interrupted
    Watch,
    /// Query the index
    Query {
        /// The query text
        text: String,

        /// Number of results
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Metadata equality filter, repeatable
        #[arg(long, value_name = "KEY=VALUE", value_parser = parse_filter)]
        filter: Vec<(String, serde_json::Value)>,
    },
    /// Index a single workspace file
    Index {
        /// Workspace-relative path
        path: String,
    },
    /// Show backend, embedding provider and item count
    Status,
}

/// Parse `key=value`. Values that are valid JSON scalars keep their type,
/// anything else is a string.
fn parse_filter(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    let value = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(v @ (serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => v,
        _ => serde_json::Value::String(value.to_owned()),
    };
    Ok((key.to_owned(), value))
}
