//! `wrag search`: nearest-chunk retrieval within one workspace.
//!
//! Embeds the query with the configured provider, then ranks the
//! workspace's chunks by cosine distance. Only chunks embedded by the same
//! model (and dimension) are considered.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use workspace_rag_core::models::RetrievedChunk;
use workspace_rag_core::store::Store;

use crate::config::Config;
use crate::pipeline::IngestPipeline;
use crate::sqlite_store::SqliteStore;

/// One printed or serialized search hit.
#[derive(Debug, Serialize)]
struct SearchHit<'a> {
    rank: usize,
    distance: f64,
    file_id: &'a str,
    file_name: &'a str,
    item_id: &'a str,
    chunk_index: i64,
    content: &'a str,
}

/// Resolve the effective `k`: the configured default when unset, capped at
/// `retrieval.max_k`.
pub fn effective_k(config: &Config, k: Option<usize>) -> usize {
    k.unwrap_or(config.retrieval.default_k)
        .min(config.retrieval.max_k)
}

pub async fn run_search(
    config: &Config,
    workspace: &str,
    query: &str,
    k: Option<usize>,
    file_ids: Vec<String>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let k = effective_k(config, k);
    let store = SqliteStore::open(config).await?;
    let pipeline = IngestPipeline::from_config(config, Arc::new(store.clone()))?;

    let filter = if file_ids.is_empty() {
        None
    } else {
        Some(file_ids.as_slice())
    };
    let results = pipeline.search(workspace, query, k, filter).await;
    let results = match results {
        Ok(r) => r,
        Err(e) => {
            store.pool().close().await;
            return Err(e.into());
        }
    };

    let names = file_names(&store, &results).await?;
    store.pool().close().await;

    let hits: Vec<SearchHit<'_>> = results
        .iter()
        .enumerate()
        .map(|(i, r)| SearchHit {
            rank: i + 1,
            distance: r.distance,
            file_id: &r.file_id,
            file_name: names.get(&r.file_id).map(String::as_str).unwrap_or("(unknown)"),
            item_id: &r.item_id,
            chunk_index: r.chunk_index,
            content: &r.content,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for hit in &hits {
        println!(
            "{}. [{:.4}] {} #{}",
            hit.rank, hit.distance, hit.file_name, hit.chunk_index
        );
        println!("    file: {}", hit.file_id);
        println!("    excerpt: \"{}\"", snippet(hit.content, 240));
        println!();
    }

    Ok(())
}

async fn file_names(
    store: &SqliteStore,
    results: &[RetrievedChunk],
) -> Result<HashMap<String, String>> {
    let mut names = HashMap::new();
    for r in results {
        if names.contains_key(&r.file_id) {
            continue;
        }
        if let Some(file) = store.get_file(&r.file_id).await? {
            names.insert(r.file_id.clone(), file.name);
        }
    }
    Ok(names)
}

/// First `max_chars` characters of `text` on one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut)
}
