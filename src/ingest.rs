//! CLI runners for `wrag ingest`, `wrag reprocess` and `wrag delete`.
//!
//! Each runner opens the store, builds an [`IngestPipeline`] from config,
//! and prints a short summary to stdout. Per-file failures are listed and
//! turn the command into a non-zero exit.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::IngestPipeline;
use crate::progress::{IngestProgressEvent, ProgressMode};
use crate::sqlite_store::SqliteStore;
use crate::uploads;
use workspace_rag_core::store::Store;

async fn open_pipeline(config: &Config) -> Result<(SqliteStore, IngestPipeline)> {
    let store = SqliteStore::open(config).await?;
    let pipeline = IngestPipeline::from_config(config, Arc::new(store.clone()))?;
    Ok((store, pipeline))
}

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    workspace: &str,
    declared_type: Option<&str>,
    progress: ProgressMode,
) -> Result<()> {
    if workspace.trim().is_empty() {
        bail!("Workspace id must not be empty");
    }

    let reporter = progress.reporter();
    reporter.report(IngestProgressEvent::Discovering {
        root: path.display().to_string(),
    });
    let files = uploads::collect_uploads(path, &config.ingest)?;

    let (store, pipeline) = open_pipeline(config).await?;
    let results = pipeline
        .ingest_paths(&files, workspace, declared_type, reporter.as_ref())
        .await;

    println!("ingest {}", path.display());

    let mut ingested = 0u64;
    let mut chunks_written = 0u64;
    let mut failures = Vec::new();
    for (file, result) in &results {
        match result {
            Ok(outcome) => {
                ingested += 1;
                chunks_written += outcome.chunks as u64;
                println!(
                    "  ingested {} -> {} ({} chunks)",
                    outcome.name, outcome.file_id, outcome.chunks
                );
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "ingest failed");
                failures.push(format!("{}: {}", file.display(), e));
            }
        }
    }

    println!("  workspace: {}", workspace);
    println!("  files found: {}", files.len());
    println!("  ingested: {}", ingested);
    println!("  failed: {}", failures.len());
    println!("  chunks written: {}", chunks_written);

    store.pool().close().await;

    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("  error: {}", failure);
        }
        bail!("{} of {} files failed to ingest", failures.len(), files.len());
    }

    println!("ok");
    Ok(())
}

pub async fn run_reprocess(config: &Config, file_id: &str) -> Result<()> {
    let (store, pipeline) = open_pipeline(config).await?;
    let outcome = pipeline.reprocess_file(file_id).await;
    store.pool().close().await;
    let outcome = outcome?;

    println!("reprocess {}", outcome.file_id);
    println!("  name: {}", outcome.name);
    println!("  workspace: {}", outcome.workspace_id);
    println!("  chunks written: {}", outcome.chunks);
    println!("  model: {}", outcome.embedding_model);
    println!("ok");
    Ok(())
}

pub async fn run_delete(config: &Config, file_id: &str) -> Result<()> {
    // Deleting needs no embedding provider.
    let store = SqliteStore::open(config).await?;
    let deleted = store.delete_file(file_id).await;
    store.pool().close().await;

    if !deleted? {
        bail!("File not found: {}", file_id);
    }
    println!("deleted {}", file_id);
    Ok(())
}
