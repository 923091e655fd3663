//! `wrag files` and `wrag show`: file listing and detail views.

use anyhow::{bail, Result};
use serde::Serialize;

use workspace_rag_core::models::{FileItem, FileRecord};
use workspace_rag_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// File detail with its chunks, used by `wrag show --json`.
#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    #[serde(flatten)]
    pub file: FileRecord,
    pub created: String,
    pub updated: String,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub id: String,
    pub index: i64,
    pub char_start: i64,
    pub char_end: i64,
    pub hash: String,
    pub text: String,
}

impl From<FileItem> for ChunkResponse {
    fn from(item: FileItem) -> Self {
        Self {
            id: item.id,
            index: item.chunk_index,
            char_start: item.char_start,
            char_end: item.char_end,
            hash: item.hash,
            text: item.content,
        }
    }
}

/// Load a file and all its chunks.
pub async fn get_file(store: &dyn Store, id: &str) -> Result<FileResponse> {
    let Some(file) = store.get_file(id).await? else {
        bail!("file not found: {}", id);
    };
    let chunks = store
        .file_items(id)
        .await?
        .into_iter()
        .map(ChunkResponse::from)
        .collect();

    Ok(FileResponse {
        created: format_ts_iso(file.created_at),
        updated: format_ts_iso(file.updated_at),
        file,
        chunks,
    })
}

pub async fn run_files(config: &Config, workspace: &str, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let files = store.list_files(workspace).await;
    store.pool().close().await;
    let files = files?;

    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    if files.is_empty() {
        println!("No files in workspace '{}'.", workspace);
        return Ok(());
    }

    println!(
        "{:<36}  {:<8} {:>10}  {:<20}  {}",
        "ID", "KIND", "SIZE", "UPDATED", "NAME"
    );
    for f in &files {
        println!(
            "{:<36}  {:<8} {:>10}  {:<20}  {}",
            f.id,
            f.kind,
            f.size_bytes,
            format_ts_iso(f.updated_at),
            f.name
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, id: &str, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let file = get_file(&store, id).await;
    store.pool().close().await;
    let file = file?;

    if json {
        println!("{}", serde_json::to_string_pretty(&file)?);
        return Ok(());
    }

    let f = &file.file;
    println!("--- File ---");
    println!("id:           {}", f.id);
    println!("name:         {}", f.name);
    println!("workspace:    {}", f.workspace_id);
    println!("kind:         {}", f.kind);
    if let Some(ref path) = f.storage_path {
        println!("storage_path: {}", path);
    }
    println!("size_bytes:   {}", f.size_bytes);
    println!("sha256:       {}", f.content_hash);
    println!("model:        {} ({} dims)", f.embedding_model, f.embedding_dims);
    println!("created_at:   {}", file.created);
    println!("updated_at:   {}", file.updated);
    println!();

    println!("--- Chunks ({}) ---", file.chunks.len());
    for chunk in &file.chunks {
        println!(
            "[chunk {}] chars {}..{}",
            chunk.index, chunk.char_start, chunk.char_end
        );
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use workspace_rag_core::models::FileKind;
    use workspace_rag_core::store::memory::InMemoryStore;

    #[test]
    fn iso_timestamps() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts_iso(1_700_000_000), "2023-11-14T22:13:20Z");
    }

    #[tokio::test]
    async fn get_file_returns_chunks_in_order() {
        let store = InMemoryStore::new();
        let file = FileRecord {
            id: "f1".to_string(),
            workspace_id: "ws".to_string(),
            name: "a.txt".to_string(),
            kind: FileKind::Text,
            storage_path: None,
            size_bytes: 6,
            content_hash: "h".to_string(),
            embedding_model: "hashed-4".to_string(),
            embedding_dims: 4,
            created_at: 0,
            updated_at: 0,
        };
        let items: Vec<FileItem> = (0..2)
            .map(|i| FileItem {
                id: format!("i{}", i),
                file_id: "f1".to_string(),
                workspace_id: "ws".to_string(),
                chunk_index: i,
                content: format!("chunk{}", i),
                char_start: i * 3,
                char_end: i * 3 + 3,
                tokens: 3,
                hash: "x".to_string(),
                embedding: vec![1.0, 0.0, 0.0, 0.0],
                embedding_model: "hashed-4".to_string(),
            })
            .collect();
        store.commit_file(&file, &items).await.unwrap();

        let response = get_file(&store, "f1").await.unwrap();
        assert_eq!(response.chunks.len(), 2);
        assert_eq!(response.chunks[1].text, "chunk1");
        assert!(get_file(&store, "missing").await.is_err());
    }
}
