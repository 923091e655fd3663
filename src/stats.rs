//! Database statistics and health overview.
//!
//! Summarizes what is indexed: file and chunk counts per workspace and the
//! embedding models that produced the stored vectors. Used by `wrag stats`.

use anyhow::Result;

use workspace_rag_core::models::WorkspaceStats;
use workspace_rag_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::{list_workspaces, SqliteStore};

/// Run the stats command for one workspace, or every workspace when
/// `workspace` is `None`.
pub async fn run_stats(config: &Config, workspace: Option<&str>, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let stats = collect_stats(&store, workspace).await;
    store.pool().close().await;
    let stats = stats?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let total_files: i64 = stats.iter().map(|s| s.files).sum();
    let total_chunks: i64 = stats.iter().map(|s| s.chunks).sum();

    println!("Workspace RAG — Database Stats");
    println!("==============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Workspaces:  {}", stats.len());
    println!("  Files:       {}", total_files);
    println!("  Chunks:      {}", total_chunks);

    if !stats.is_empty() {
        println!();
        println!("  By workspace:");
        println!(
            "  {:<24} {:>6} {:>8} {:>12}   {}",
            "WORKSPACE", "FILES", "CHUNKS", "CHARS", "MODELS"
        );
        println!("  {}", "-".repeat(76));

        for s in &stats {
            let models = if s.models.is_empty() {
                "-".to_string()
            } else {
                s.models
                    .iter()
                    .map(|(model, n)| format!("{} ({})", model, n))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            println!(
                "  {:<24} {:>6} {:>8} {:>12}   {}",
                s.workspace_id, s.files, s.chunks, s.characters, models
            );
        }
    }

    println!();
    Ok(())
}

async fn collect_stats(store: &SqliteStore, workspace: Option<&str>) -> Result<Vec<WorkspaceStats>> {
    let workspaces = match workspace {
        Some(ws) => vec![ws.to_string()],
        None => list_workspaces(store.pool()).await?,
    };
    let mut stats = Vec::with_capacity(workspaces.len());
    for ws in &workspaces {
        stats.push(store.workspace_stats(ws).await?);
    }
    Ok(stats)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
