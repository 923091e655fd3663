//! Per-file ingestion pipeline.
//!
//! One upload is one unit of work: extract → chunk → embed → write. Every
//! stage finishes before anything is written, and the write itself is a
//! single [`Store::commit_file`] call, so a failure at any stage leaves the
//! store exactly as it was.
//!
//! ```text
//! UploadEvent ─▶ extract ─▶ chunk ─▶ embed ─▶ commit_file
//!               (blocking)          (batched)  (one transaction)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use workspace_rag_core::chunk::{chunk_text, ChunkParams};
use workspace_rag_core::embedding::{embed_all, EmbeddingProvider};
use workspace_rag_core::error::{ExtractError, IngestError};
use workspace_rag_core::models::{FileItem, FileKind, FileRecord, RetrievedChunk};
use workspace_rag_core::retrieve;
use workspace_rag_core::store::Store;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::extract_text;
use crate::progress::{IngestProgressEvent, IngestProgressReporter};

/// A file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct UploadEvent {
    pub workspace_id: String,
    pub name: String,
    pub bytes: Vec<u8>,
    /// MIME type, extension, or kind name.
    pub declared_type: String,
    /// Where the raw bytes are kept; required for later reprocessing.
    pub storage_path: Option<String>,
}

impl UploadEvent {
    /// Build an upload from a local file. The declared type defaults to the
    /// file's extension and the storage location to its absolute path.
    pub async fn from_path(
        path: &Path,
        workspace_id: &str,
        declared_type: Option<&str>,
        max_file_bytes: u64,
    ) -> Result<Self, IngestError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let declared_type = match declared_type {
            Some(t) => t.to_string(),
            None => FileKind::from_file_name(&name)?.mime().to_string(),
        };

        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > max_file_bytes {
            return Err(IngestError::FileTooLarge {
                size: metadata.len(),
                limit: max_file_bytes,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let absolute = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());

        Ok(Self {
            workspace_id: workspace_id.to_string(),
            name,
            bytes,
            declared_type,
            storage_path: Some(absolute.display().to_string()),
        })
    }
}

/// Result of one successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub file_id: String,
    pub workspace_id: String,
    pub name: String,
    pub kind: FileKind,
    pub chunks: usize,
    pub characters: usize,
    pub embedding_model: String,
    /// True when an existing file's chunks were replaced.
    pub replaced: bool,
}

/// Ingestion and retrieval over one store and one embedding provider.
pub struct IngestPipeline {
    store: Arc<dyn Store>,
    provider: Box<dyn EmbeddingProvider>,
    params: ChunkParams,
    batch_size: usize,
    max_file_bytes: u64,
    concurrency: usize,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Box<dyn EmbeddingProvider>,
        params: ChunkParams,
    ) -> Self {
        Self {
            store,
            provider,
            params,
            batch_size: 64,
            max_file_bytes: 20 * 1024 * 1024,
            concurrency: 4,
        }
    }

    /// Build a pipeline from the `[chunking]`, `[embedding]` and `[ingest]`
    /// sections.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let params = config.chunking.params()?;
        let provider = create_provider(&config.embedding)?;
        Ok(Self::new(store, provider, params)
            .with_batch_size(config.embedding.batch_size)
            .with_max_file_bytes(config.ingest.max_file_bytes)
            .with_concurrency(config.ingest.concurrency))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Ingest a new upload as a new file.
    pub async fn ingest_upload(&self, event: UploadEvent) -> Result<IngestOutcome, IngestError> {
        let file_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        self.process(file_id, now, event, false).await
    }

    /// Re-run the pipeline for an existing file from its storage location,
    /// replacing its chunk set.
    pub async fn reprocess_file(&self, file_id: &str) -> Result<IngestOutcome, IngestError> {
        let file = self
            .store
            .get_file(file_id)
            .await?
            .ok_or_else(|| IngestError::FileNotFound(file_id.to_string()))?;
        let storage_path = file
            .storage_path
            .clone()
            .ok_or_else(|| IngestError::MissingStorageLocation(file_id.to_string()))?;

        let metadata = tokio::fs::metadata(&storage_path).await?;
        if metadata.len() > self.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                size: metadata.len(),
                limit: self.max_file_bytes,
            });
        }
        let bytes = tokio::fs::read(&storage_path).await?;

        let event = UploadEvent {
            workspace_id: file.workspace_id.clone(),
            name: file.name.clone(),
            bytes,
            declared_type: file.kind.mime().to_string(),
            storage_path: Some(storage_path),
        };
        self.process(file.id.clone(), file.created_at, event, true)
            .await
    }

    /// Delete a file and all of its chunks. Returns `false` if it did not exist.
    pub async fn delete_file(&self, file_id: &str) -> Result<bool, IngestError> {
        let deleted = self.store.delete_file(file_id).await?;
        info!(file_id, deleted, "file deleted");
        Ok(deleted)
    }

    /// Embed `query` and return the `k` nearest chunks of the workspace.
    pub async fn search(
        &self,
        workspace_id: &str,
        query: &str,
        k: usize,
        file_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, IngestError> {
        retrieve::search(
            self.store.as_ref(),
            self.provider.as_ref(),
            workspace_id,
            query,
            k,
            file_ids,
        )
        .await
    }

    /// Ingest many local files with bounded concurrency. Results come back
    /// in input order.
    pub async fn ingest_paths(
        &self,
        paths: &[PathBuf],
        workspace_id: &str,
        declared_type: Option<&str>,
        reporter: &dyn IngestProgressReporter,
    ) -> Vec<(PathBuf, Result<IngestOutcome, IngestError>)> {
        let total = paths.len() as u64;
        let mut done = 0u64;

        let mut results: Vec<(usize, PathBuf, Result<IngestOutcome, IngestError>)> =
            stream::iter(paths.iter().enumerate().map(|(i, path)| async move {
                let result = async {
                    let event = UploadEvent::from_path(
                        path,
                        workspace_id,
                        declared_type,
                        self.max_file_bytes,
                    )
                    .await?;
                    self.ingest_upload(event).await
                }
                .await;
                (i, path.clone(), result)
            }))
            .buffer_unordered(self.concurrency)
            .inspect(|(_, path, result)| {
                done += 1;
                reporter.report(IngestProgressEvent::Ingesting {
                    n: done,
                    total,
                    name: path.display().to_string(),
                    ok: result.is_ok(),
                });
            })
            .collect()
            .await;

        results.sort_by_key(|(i, _, _)| *i);
        results
            .into_iter()
            .map(|(_, path, result)| (path, result))
            .collect()
    }

    #[tracing::instrument(
        skip_all,
        fields(file_id = %file_id, workspace_id = %event.workspace_id, name = %event.name)
    )]
    async fn process(
        &self,
        file_id: String,
        created_at: i64,
        event: UploadEvent,
        replaced: bool,
    ) -> Result<IngestOutcome, IngestError> {
        let started = Instant::now();
        let UploadEvent {
            workspace_id,
            name,
            bytes,
            declared_type,
            storage_path,
        } = event;

        if bytes.len() as u64 > self.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                size: bytes.len() as u64,
                limit: self.max_file_bytes,
            });
        }
        let kind = FileKind::parse(&declared_type)?;
        let size_bytes = bytes.len() as i64;
        let content_hash = hash_bytes(&bytes);

        let stage = Instant::now();
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
            .await
            .map_err(|e| ExtractError::CorruptFile(format!("extraction aborted: {}", e)))??;
        let extract_ms = millis(stage.elapsed());

        let windows = chunk_text(&text, self.params);
        let texts: Vec<String> = windows.iter().map(|w| w.text.to_string()).collect();
        debug!(chunks = windows.len(), characters = text.chars().count(), "chunked");

        let stage = Instant::now();
        let vectors = embed_all(self.provider.as_ref(), &texts, self.batch_size)
            .await
            .inspect_err(|e| warn!(error = %e, retryable = e.is_retryable(), "embedding failed"))?;
        let embed_ms = millis(stage.elapsed());

        let model = self.provider.model_name().to_string();
        let items: Vec<FileItem> = windows
            .iter()
            .zip(vectors)
            .map(|(w, embedding)| FileItem {
                id: Uuid::new_v4().to_string(),
                file_id: file_id.clone(),
                workspace_id: workspace_id.clone(),
                chunk_index: w.index as i64,
                content: w.text.to_string(),
                char_start: w.char_start as i64,
                char_end: w.char_end as i64,
                tokens: w.len() as i64,
                hash: w.hash(),
                embedding,
                embedding_model: model.clone(),
            })
            .collect();

        let file = FileRecord {
            id: file_id.clone(),
            workspace_id: workspace_id.clone(),
            name: name.clone(),
            kind,
            storage_path,
            size_bytes,
            content_hash,
            embedding_model: model.clone(),
            embedding_dims: self.provider.dims() as i64,
            created_at,
            updated_at: chrono::Utc::now().timestamp(),
        };

        let stage = Instant::now();
        self.store.commit_file(&file, &items).await?;
        let write_ms = millis(stage.elapsed());

        info!(
            chunks = items.len(),
            kind = %kind,
            model = %model,
            replaced,
            extract_ms,
            embed_ms,
            write_ms,
            total_ms = millis(started.elapsed()),
            "file ingested"
        );

        Ok(IngestOutcome {
            file_id,
            workspace_id,
            name,
            kind,
            chunks: items.len(),
            characters: text.chars().count(),
            embedding_model: model,
            replaced,
        })
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(bytes))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
