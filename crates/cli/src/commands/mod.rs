pub mod chat;
pub mod check;
pub mod config_cmd;
pub mod threads;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use finassist_agent::{TurnGraph, TurnRunner};
use finassist_config::AppConfig;
use finassist_core::retrieval::Retriever;
use finassist_store::{KeywordRetriever, Stores};
use tracing::{info, warn};

/// Load the config from `path` or the default location, with environment
/// overrides applied.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_layered(path),
        None => AppConfig::load(),
    };
    config.context("Failed to load config")
}

pub fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    finassist_store::from_config(&config.store).context("Failed to open the thread store")
}

/// The knowledge-base retriever, if retrieval is enabled and a knowledge
/// file is configured.
pub fn open_retriever(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn Retriever>>> {
    if !config.retrieval.enabled {
        return Ok(None);
    }
    let Some(path) = &config.retrieval.knowledge_path else {
        warn!("Retrieval enabled but no knowledge_path configured, continuing without it");
        return Ok(None);
    };

    let retriever = KeywordRetriever::from_jsonl(path)
        .with_context(|| format!("Failed to load knowledge base from {}", path.display()))?;
    info!(chunks = retriever.len(), path = %path.display(), "Loaded knowledge base");
    Ok(Some(Arc::new(retriever)))
}

/// Wire models, stores, tools and the turn graph from configuration.
pub fn build_runner(config: &AppConfig) -> anyhow::Result<Arc<TurnRunner>> {
    let models = finassist_providers::build_from_config(config);
    let stores = open_stores(config)?;
    let retriever = open_retriever(config)?;

    let graph = TurnGraph::from_config(config, &models, stores.threads.clone(), retriever);
    Ok(Arc::new(TurnRunner::new(
        Arc::new(graph),
        stores.threads,
        stores.checkpoints,
    )))
}
