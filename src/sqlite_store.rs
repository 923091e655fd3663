//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `files` / `file_items` schema
//! created by [`crate::migrate`]. A file and its full item set are written in
//! one transaction, so readers on other pool connections (WAL mode) see
//! either the previous item set or the new one.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use workspace_rag_core::embedding::{blob_to_vec, vec_to_blob};
use workspace_rag_core::error::StoreError;
use workspace_rag_core::models::{FileItem, FileKind, FileRecord, VectorRow, WorkspaceStats};
use workspace_rag_core::store::{Store, VectorScope};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const FILE_COLUMNS: &str = "id, workspace_id, name, kind, storage_path, size_bytes, content_hash, \
     embedding_model, embedding_dims, created_at, updated_at";

fn file_from_row(row: &SqliteRow) -> Result<FileRecord, StoreError> {
    let kind: String = row.get("kind");
    Ok(FileRecord {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        name: row.get("name"),
        kind: FileKind::parse(&kind).map_err(StoreError::read)?,
        storage_path: row.get("storage_path"),
        size_bytes: row.get("size_bytes"),
        content_hash: row.get("content_hash"),
        embedding_model: row.get("embedding_model"),
        embedding_dims: row.get("embedding_dims"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn commit_file(&self, file: &FileRecord, items: &[FileItem]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::write)?;

        sqlx::query(
            r#"
            INSERT INTO files (id, workspace_id, name, kind, storage_path, size_bytes,
                               content_hash, embedding_model, embedding_dims,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                storage_path = excluded.storage_path,
                size_bytes = excluded.size_bytes,
                content_hash = excluded.content_hash,
                embedding_model = excluded.embedding_model,
                embedding_dims = excluded.embedding_dims,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&file.id)
        .bind(&file.workspace_id)
        .bind(&file.name)
        .bind(file.kind.as_str())
        .bind(&file.storage_path)
        .bind(file.size_bytes)
        .bind(&file.content_hash)
        .bind(&file.embedding_model)
        .bind(file.embedding_dims)
        .bind(file.created_at)
        .bind(file.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::write)?;

        // The upsert keeps workspace_id; a mismatch rolls back when tx drops.
        let stored_ws: String = sqlx::query_scalar("SELECT workspace_id FROM files WHERE id = ?")
            .bind(&file.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::write)?;
        if stored_ws != file.workspace_id {
            return Err(StoreError::Write(format!(
                "file {} belongs to workspace {}, not {}",
                file.id, stored_ws, file.workspace_id
            )));
        }

        sqlx::query("DELETE FROM file_items WHERE file_id = ?")
            .bind(&file.id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::write)?;

        for item in items {
            if item.file_id != file.id || item.workspace_id != file.workspace_id {
                return Err(StoreError::Write(format!(
                    "item {} does not belong to file {} in workspace {}",
                    item.id, file.id, file.workspace_id
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO file_items (id, file_id, workspace_id, chunk_index, content,
                                        char_start, char_end, tokens, hash, embedding,
                                        embedding_model, embedding_dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.file_id)
            .bind(&item.workspace_id)
            .bind(item.chunk_index)
            .bind(&item.content)
            .bind(item.char_start)
            .bind(item.char_end)
            .bind(item.tokens)
            .bind(&item.hash)
            .bind(vec_to_blob(&item.embedding))
            .bind(&item.embedding_model)
            .bind(item.dims() as i64)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::write)?;
        }

        tx.commit().await.map_err(StoreError::write)?;
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::read)?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn list_files(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM files WHERE workspace_id = ? ORDER BY created_at ASC, id ASC",
            FILE_COLUMNS
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::read)?;

        rows.iter().map(file_from_row).collect()
    }

    async fn delete_file(&self, id: &str) -> Result<bool, StoreError> {
        // file_items rows go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::write)?;
        Ok(result.rows_affected() > 0)
    }

    async fn file_items(&self, file_id: &str) -> Result<Vec<FileItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_id, workspace_id, chunk_index, content, char_start, char_end,
                   tokens, hash, embedding, embedding_model
            FROM file_items
            WHERE file_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::read)?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                FileItem {
                    id: row.get("id"),
                    file_id: row.get("file_id"),
                    workspace_id: row.get("workspace_id"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    char_start: row.get("char_start"),
                    char_end: row.get("char_end"),
                    tokens: row.get("tokens"),
                    hash: row.get("hash"),
                    embedding: blob_to_vec(&blob),
                    embedding_model: row.get("embedding_model"),
                }
            })
            .collect())
    }

    async fn vector_rows(&self, scope: &VectorScope<'_>) -> Result<Vec<VectorRow>, StoreError> {
        if matches!(scope.file_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT seq, id, file_id, chunk_index, content, embedding FROM file_items WHERE workspace_id = ",
        );
        qb.push_bind(scope.workspace_id)
            .push(" AND embedding_model = ")
            .push_bind(scope.model)
            .push(" AND embedding_dims = ")
            .push_bind(scope.dims as i64);

        if let Some(ids) = scope.file_ids {
            qb.push(" AND file_id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");
        }
        qb.push(" ORDER BY seq ASC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::read)?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                VectorRow {
                    item_id: row.get("id"),
                    file_id: row.get("file_id"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    seq: row.get("seq"),
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn workspace_stats(&self, workspace_id: &str) -> Result<WorkspaceStats, StoreError> {
        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE workspace_id = ?")
            .bind(workspace_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::read)?;

        let totals = sqlx::query(
            "SELECT COUNT(*) AS chunks, COALESCE(SUM(tokens), 0) AS characters FROM file_items WHERE workspace_id = ?",
        )
        .bind(workspace_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::read)?;

        let model_rows = sqlx::query(
            r#"
            SELECT embedding_model, COUNT(*) AS n
            FROM file_items
            WHERE workspace_id = ?
            GROUP BY embedding_model
            ORDER BY embedding_model ASC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::read)?;

        Ok(WorkspaceStats {
            workspace_id: workspace_id.to_string(),
            files,
            chunks: totals.get("chunks"),
            characters: totals.get("characters"),
            models: model_rows
                .iter()
                .map(|r| (r.get("embedding_model"), r.get("n")))
                .collect(),
        })
    }
}

/// Workspace ids that own at least one file, sorted.
pub async fn list_workspaces(pool: &SqlitePool) -> Result<Vec<String>, StoreError> {
    sqlx::query_scalar("SELECT DISTINCT workspace_id FROM files ORDER BY workspace_id ASC")
        .fetch_all(pool)
        .await
        .map_err(StoreError::read)
}
