//! Storage abstraction for Workspace RAG.
//!
//! The [`Store`] trait defines the persistence operations needed by the
//! ingestion pipeline and the retriever, enabling pluggable backends
//! (SQLite in the app crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{FileItem, FileRecord, VectorRow, WorkspaceStats};

/// Selects the stored vectors a retrieval query may compare against.
///
/// Only rows in `workspace_id` whose embedding was produced by `model`
/// with `dims` entries are eligible.
#[derive(Debug, Clone, Copy)]
pub struct VectorScope<'a> {
    pub workspace_id: &'a str,
    pub model: &'a str,
    pub dims: usize,
    /// Further restrict to these files, if set.
    pub file_ids: Option<&'a [String]>,
}

/// Abstract storage backend for Workspace RAG.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`commit_file`](Store::commit_file) | Upsert a file and atomically replace all its items |
/// | [`get_file`](Store::get_file) | Retrieve a file record |
/// | [`list_files`](Store::list_files) | List files of a workspace |
/// | [`delete_file`](Store::delete_file) | Delete a file and its items |
/// | [`file_items`](Store::file_items) | Items of one file, in chunk order |
/// | [`vector_rows`](Store::vector_rows) | Eligible vectors for a retrieval query |
/// | [`workspace_stats`](Store::workspace_stats) | Counts for one workspace |
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert `file` and replace every item of that file with `items`, as
    /// one atomic unit. Readers observe either the previous complete item
    /// set or the new one, never a mix. On error nothing changes. A file
    /// keeps the workspace it was first committed under; a record with the
    /// same id and another workspace is rejected with `StoreError::Write`.
    async fn commit_file(&self, file: &FileRecord, items: &[FileItem]) -> Result<(), StoreError>;

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StoreError>;

    /// Files of a workspace, oldest first.
    async fn list_files(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError>;

    /// Delete a file and all its items. Returns `false` if it did not exist.
    async fn delete_file(&self, id: &str) -> Result<bool, StoreError>;

    /// Items of one file ordered by `chunk_index`.
    async fn file_items(&self, file_id: &str) -> Result<Vec<FileItem>, StoreError>;

    /// Vectors eligible under `scope`, in insertion order.
    async fn vector_rows(&self, scope: &VectorScope<'_>) -> Result<Vec<VectorRow>, StoreError>;

    async fn workspace_stats(&self, workspace_id: &str) -> Result<WorkspaceStats, StoreError>;
}
