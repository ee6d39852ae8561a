mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ragdex_core::config::{Config, DEFAULT_CONFIG_FILE};
use ragdex_core::tools::{self, GetIndexStatusInput, IndexContentInput, QueryIndexInput};
use ragdex_core::ToolContext;
use ragdex_index::IndexSyncService;
use serde::Serialize;

use crate::cli::{Cli, Commands};

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn start_service(config: &Config) -> anyhow::Result<Arc<IndexSyncService>> {
    let service = Arc::new(IndexSyncService::new(config.service_config()));
    service
        .initialize()
        .await
        .context("failed to initialize index sync service")?;
    Ok(service)
}

/// The in-memory backend starts empty in every process; fill it before reading.
async fn ensure_populated(config: &Config, service: &IndexSyncService) -> anyhow::Result<()> {
    if config.rag.vector_store.backend_name() == "memory" {
        tracing::info!("memory backend: syncing workspace before reading the index");
        service.sync_workspace_index().await?;
    }
    Ok(())
}

fn tool_context(config: &Config, service: &IndexSyncService) -> anyhow::Result<ToolContext> {
    let manager = service
        .manager()
        .context("index sync service is not initialized")?;
    Ok(ToolContext {
        workspace_root: config.workspace.clone(),
        manager,
        rag_config: config.rag_config(),
        chunking: config.rag.chunking,
    })
}

async fn watch(service: Arc<IndexSyncService>) -> anyhow::Result<()> {
    if let Some(report) = service.sync_workspace_index().await? {
        print_json(&report)?;
    }
    if !service.start_watching()? {
        anyhow::bail!("watching is disabled (rag.sync.auto_watch = false)");
    }
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("received shutdown signal");
    service.stop_watching();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = Config::load(&config_path)?;
    config.validate()?;

    let service = start_service(&config).await?;

    match cli.command {
        Commands::Sync => match service.sync_workspace_index().await? {
            Some(report) => print_json(&report)?,
            None => tracing::warn!("a sync is already running"),
        },
        Commands::Watch => watch(service).await?,
        Commands::Query {
            text,
            top_k,
            filter,
        } => {
            ensure_populated(&config, &service).await?;
            let ctx = tool_context(&config, &service)?;
            let input = QueryIndexInput {
                query: text,
                top_k,
                filter: filter.into_iter().collect(),
            };
            print_json(&tools::query_index(&ctx, input).await)?;
        }
        Commands::Index { path } => {
            let ctx = tool_context(&config, &service)?;
            let input = IndexContentInput {
                path: Some(path),
                content: None,
                id: None,
                metadata: std::collections::HashMap::new(),
            };
            print_json(&tools::index_content(&ctx, input).await)?;
        }
        Commands::Status => {
            ensure_populated(&config, &service).await?;
            let ctx = tool_context(&config, &service)?;
            print_json(&tools::get_index_status(&ctx, GetIndexStatusInput::default()).await)?;
        }
    }

    Ok(())
}
