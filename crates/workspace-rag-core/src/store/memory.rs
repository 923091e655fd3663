//! In-memory [`Store`] implementation for testing and embedding in other
//! processes.
//!
//! All state sits behind one `std::sync::RwLock`, so [`Store::commit_file`]
//! swaps a file's items under a single write guard. Batches are validated
//! before anything is touched, mirroring the constraints the SQLite schema
//! enforces (`(file_id, chunk_index)` uniqueness, matching parent file and
//! workspace).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{FileItem, FileRecord, VectorRow, WorkspaceStats};

use super::{Store, VectorScope};

struct StoredItem {
    seq: i64,
    item: FileItem,
}

#[derive(Default)]
struct State {
    files: HashMap<String, FileRecord>,
    items: Vec<StoredItem>,
    next_seq: i64,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Read("in-memory store lock poisoned".to_string())
}

fn validate_batch(file: &FileRecord, items: &[FileItem]) -> Result<(), StoreError> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.file_id != file.id {
            return Err(StoreError::Write(format!(
                "item {} belongs to file {}, not {}",
                item.id, item.file_id, file.id
            )));
        }
        if item.workspace_id != file.workspace_id {
            return Err(StoreError::Write(format!(
                "item {} is scoped to workspace {}, file is in {}",
                item.id, item.workspace_id, file.workspace_id
            )));
        }
        if !seen.insert(item.chunk_index) {
            return Err(StoreError::Write(format!(
                "duplicate chunk_index {} for file {}",
                item.chunk_index, file.id
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn commit_file(&self, file: &FileRecord, items: &[FileItem]) -> Result<(), StoreError> {
        validate_batch(file, items)?;

        let mut state = self.state.write().map_err(|_| poisoned())?;
        if let Some(existing) = state.files.get(&file.id) {
            if existing.workspace_id != file.workspace_id {
                return Err(StoreError::Write(format!(
                    "file {} belongs to workspace {}, not {}",
                    file.id, existing.workspace_id, file.workspace_id
                )));
            }
        }
        state.items.retain(|s| s.item.file_id != file.id);
        for item in items {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.items.push(StoredItem {
                seq,
                item: item.clone(),
            });
        }
        state.files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.files.get(id).cloned())
    }

    async fn list_files(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.workspace_id == workspace_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(files)
    }

    async fn delete_file(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let existed = state.files.remove(id).is_some();
        state.items.retain(|s| s.item.file_id != id);
        Ok(existed)
    }

    async fn file_items(&self, file_id: &str) -> Result<Vec<FileItem>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut items: Vec<FileItem> = state
            .items
            .iter()
            .filter(|s| s.item.file_id == file_id)
            .map(|s| s.item.clone())
            .collect();
        items.sort_by_key(|i| i.chunk_index);
        Ok(items)
    }

    async fn vector_rows(&self, scope: &VectorScope<'_>) -> Result<Vec<VectorRow>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .items
            .iter()
            .filter(|s| {
                s.item.workspace_id == scope.workspace_id
                    && s.item.embedding_model == scope.model
                    && s.item.dims() == scope.dims
                    && scope
                        .file_ids
                        .map_or(true, |ids| ids.iter().any(|id| *id == s.item.file_id))
            })
            .map(|s| VectorRow {
                item_id: s.item.id.clone(),
                file_id: s.item.file_id.clone(),
                chunk_index: s.item.chunk_index,
                content: s.item.content.clone(),
                seq: s.seq,
                embedding: s.item.embedding.clone(),
            })
            .collect())
    }

    async fn workspace_stats(&self, workspace_id: &str) -> Result<WorkspaceStats, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut models: BTreeMap<String, i64> = BTreeMap::new();
        let mut chunks = 0i64;
        let mut characters = 0i64;
        for s in state
            .items
            .iter()
            .filter(|s| s.item.workspace_id == workspace_id)
        {
            chunks += 1;
            characters += s.item.tokens;
            *models.entry(s.item.embedding_model.clone()).or_default() += 1;
        }
        Ok(WorkspaceStats {
            workspace_id: workspace_id.to_string(),
            files: state
                .files
                .values()
                .filter(|f| f.workspace_id == workspace_id)
                .count() as i64,
            chunks,
            characters,
            models: models.into_iter().collect(),
        })
    }
}
