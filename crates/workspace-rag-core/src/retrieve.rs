//! Workspace-scoped nearest-chunk retrieval.
//!
//! The retriever operates entirely through the [`Store`] trait. The store
//! only narrows the candidate set (workspace, embedding model, dims,
//! optional file ids); ranking happens here so every backend orders results
//! the same way.
//!
//! # Ranking
//!
//! 1. Compute the cosine distance between the query and every eligible row.
//! 2. Sort by distance ascending; ties go to the row inserted first.
//! 3. Truncate to `k`.

use std::cmp::Ordering;

use tracing::debug;

use crate::embedding::{cosine_distance, embed_one, EmbeddingProvider};
use crate::error::{IngestError, StoreError};
use crate::models::{RetrievedChunk, VectorRow};
use crate::store::{Store, VectorScope};

/// Inputs for one retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalQuery<'a> {
    pub workspace_id: &'a str,
    pub vector: &'a [f32],
    /// Model that produced `vector`. Only rows from the same model compete.
    pub model: &'a str,
    pub k: usize,
    pub file_ids: Option<&'a [String]>,
}

/// Return the `k` chunks of the workspace nearest to the query vector.
///
/// Returns an empty list, not an error, when `k` is zero or the workspace
/// has no eligible chunks.
pub async fn retrieve<S: Store + ?Sized>(
    store: &S,
    query: &RetrievalQuery<'_>,
) -> Result<Vec<RetrievedChunk>, StoreError> {
    if query.k == 0 || query.vector.is_empty() {
        return Ok(Vec::new());
    }

    let scope = VectorScope {
        workspace_id: query.workspace_id,
        model: query.model,
        dims: query.vector.len(),
        file_ids: query.file_ids,
    };
    let rows = store.vector_rows(&scope).await?;
    let candidates = rows.len();
    let results = rank(rows, query.vector, query.k);

    debug!(
        workspace_id = query.workspace_id,
        model = query.model,
        candidates,
        returned = results.len(),
        "retrieval ranked"
    );
    Ok(results)
}

/// Embed `text` with `provider` and retrieve the `k` nearest chunks.
pub async fn search<S: Store + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    workspace_id: &str,
    text: &str,
    k: usize,
    file_ids: Option<&[String]>,
) -> Result<Vec<RetrievedChunk>, IngestError> {
    if text.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let vector = embed_one(provider, text).await?;
    let query = RetrievalQuery {
        workspace_id,
        vector: &vector,
        model: provider.model_name(),
        k,
        file_ids,
    };
    Ok(retrieve(store, &query).await?)
}

/// Order rows by cosine distance to `query` (ties: lower `seq` first) and
/// keep the best `k`.
pub fn rank(rows: Vec<VectorRow>, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
    let mut scored: Vec<(f64, VectorRow)> = rows
        .into_iter()
        .map(|row| (cosine_distance(query, &row.embedding), row))
        .collect();

    scored.sort_by(|(da, a), (db, b)| {
        da.partial_cmp(db)
            .unwrap_or(Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(distance, row)| RetrievedChunk {
            item_id: row.item_id,
            file_id: row.file_id,
            chunk_index: row.chunk_index,
            content: row.content,
            distance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedProvider;
    use crate::models::{FileItem, FileKind, FileRecord};
    use crate::store::memory::InMemoryStore;

    fn file(id: &str, workspace: &str, model: &str, dims: i64) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            workspace_id: workspace.to_string(),
            name: id.to_string(),
            kind: FileKind::Text,
            storage_path: None,
            size_bytes: 0,
            content_hash: String::new(),
            embedding_model: model.to_string(),
            embedding_dims: dims,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn item(file: &FileRecord, index: i64, text: &str, vector: Vec<f32>) -> FileItem {
        FileItem {
            id: format!("{}#{}", file.id, index),
            file_id: file.id.clone(),
            workspace_id: file.workspace_id.clone(),
            chunk_index: index,
            content: text.to_string(),
            char_start: 0,
            char_end: 0,
            tokens: text.len() as i64,
            hash: String::new(),
            embedding: vector,
            embedding_model: file.embedding_model.clone(),
        }
    }

    fn query<'a>(workspace: &'a str, vector: &'a [f32], k: usize) -> RetrievalQuery<'a> {
        RetrievalQuery {
            workspace_id: workspace,
            vector,
            model: "m",
            k,
            file_ids: None,
        }
    }

    #[tokio::test]
    async fn identical_vector_ranks_first_with_zero_distance() {
        let store = InMemoryStore::new();
        let f = file("f", "ws", "m", 3);
        store
            .commit_file(
                &f,
                &[
                    item(&f, 0, "a", vec![1.0, 0.0, 0.0]),
                    item(&f, 1, "b", vec![0.2, 0.9, 0.1]),
                    item(&f, 2, "c", vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let q = [0.2, 0.9, 0.1];
        let results = retrieve(&store, &query("ws", &q, 2)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "b");
        assert!(results[0].distance < 1e-9);
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn ties_break_by_insertion_order() {
        let store = InMemoryStore::new();
        let first = file("first", "ws", "m", 2);
        let second = file("second", "ws", "m", 2);
        store
            .commit_file(&first, &[item(&first, 0, "early", vec![1.0, 1.0])])
            .await
            .unwrap();
        store
            .commit_file(&second, &[item(&second, 0, "late", vec![2.0, 2.0])])
            .await
            .unwrap();

        let q = [1.0, 1.0];
        let results = retrieve(&store, &query("ws", &q, 2)).await.unwrap();
        assert_eq!(results[0].content, "early");
        assert_eq!(results[1].content, "late");
    }

    #[tokio::test]
    async fn other_workspaces_never_leak() {
        let store = InMemoryStore::new();
        let a = file("a", "ws-a", "m", 2);
        let b = file("b", "ws-b", "m", 2);
        store
            .commit_file(&a, &[item(&a, 0, "exact match in A", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .commit_file(&b, &[item(&b, 0, "far in B", vec![-1.0, 0.2])])
            .await
            .unwrap();

        let q = [1.0, 0.0];
        let results = retrieve(&store, &query("ws-b", &q, 10)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_id, "b");
    }

    #[tokio::test]
    async fn empty_workspace_and_zero_k_return_empty() {
        let store = InMemoryStore::new();
        let q = [1.0, 0.0];
        assert!(retrieve(&store, &query("nobody", &q, 5))
            .await
            .unwrap()
            .is_empty());

        let f = file("f", "ws", "m", 2);
        store
            .commit_file(&f, &[item(&f, 0, "a", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert!(retrieve(&store, &query("ws", &q, 0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fewer_than_k_returns_all() {
        let store = InMemoryStore::new();
        let f = file("f", "ws", "m", 2);
        store
            .commit_file(
                &f,
                &[
                    item(&f, 0, "a", vec![1.0, 0.0]),
                    item(&f, 1, "b", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        let q = [1.0, 0.0];
        assert_eq!(retrieve(&store, &query("ws", &q, 10)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn vectors_from_other_models_are_ignored() {
        let store = InMemoryStore::new();
        let old = file("old", "ws", "old-model", 2);
        let new = file("new", "ws", "m", 2);
        store
            .commit_file(&old, &[item(&old, 0, "old space", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .commit_file(&new, &[item(&new, 0, "new space", vec![0.0, 1.0])])
            .await
            .unwrap();

        let q = [1.0, 0.0];
        let results = retrieve(&store, &query("ws", &q, 5)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "new space");
    }

    #[tokio::test]
    async fn file_filter_restricts_candidates() {
        let store = InMemoryStore::new();
        let a = file("a", "ws", "m", 2);
        let b = file("b", "ws", "m", 2);
        store
            .commit_file(&a, &[item(&a, 0, "a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .commit_file(&b, &[item(&b, 0, "b", vec![1.0, 0.0])])
            .await
            .unwrap();

        let only_b = vec!["b".to_string()];
        let q = [1.0, 0.0];
        let mut req = query("ws", &q, 5);
        req.file_ids = Some(&only_b);
        let results = retrieve(&store, &req).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_id, "b");
    }

    #[tokio::test]
    async fn search_embeds_query_with_provider() {
        let store = InMemoryStore::new();
        let provider = HashedProvider::new(64);
        let f = file("f", "ws", provider.model_name(), 64);
        let texts = ["invoices are due monthly", "the cat sat on the mat"];
        let items: Vec<FileItem> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| item(&f, i as i64, t, crate::embedding::hashed_embedding(t, 64)))
            .collect();
        store.commit_file(&f, &items).await.unwrap();

        let results = search(&store, &provider, "ws", "the cat sat on the mat", 1, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "the cat sat on the mat");
        assert!(results[0].distance < 1e-6);
    }

    #[tokio::test]
    async fn punctuation_only_chunk_matches_itself() {
        let store = InMemoryStore::new();
        let provider = HashedProvider::new(64);
        let f = file("f", "ws", provider.model_name(), 64);
        let texts = ["alpha beta gamma", "---- *** ----"];
        let items: Vec<FileItem> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| item(&f, i as i64, t, crate::embedding::hashed_embedding(t, 64)))
            .collect();
        store.commit_file(&f, &items).await.unwrap();

        let results = search(&store, &provider, "ws", "---- *** ----", 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "---- *** ----");
        assert!(results[0].distance < 1e-6);
    }
}
