//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the deterministic in-process [`HashedProvider`], and pure
//! helpers for vector serialization and distance computation.
//!
//! Remote and model-backed providers (OpenAI, Ollama, fastembed) live in the
//! `workspace-rag` app crate.
//!
//! # Distance Metric
//!
//! Retrieval uses **cosine distance**, `1 - cosine_similarity`, everywhere.
//! Identical directions have distance `0.0`, orthogonal vectors `1.0`,
//! opposite vectors `2.0`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::EmbedError;

/// Trait for embedding providers.
///
/// One capability, `embed_batch`, plus metadata identifying the embedding
/// space. Vectors from providers with different `model_name()` or `dims()`
/// are never compared with each other.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per text in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed a single text.
pub async fn embed_one(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, EmbedError> {
    let mut vectors = embed_all(provider, &[text.to_string()], 1).await?;
    vectors.pop().ok_or(EmbedError::CountMismatch {
        expected: 1,
        actual: 0,
    })
}

/// Embed `texts` in batches of `batch_size`, verifying that every batch
/// returns one vector per input and that every vector has `provider.dims()`
/// entries.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = provider.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(EmbedError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }
        for v in &vectors {
            if v.len() != provider.dims() {
                return Err(EmbedError::DimensionMismatch {
                    expected: provider.dims(),
                    actual: v.len(),
                });
            }
        }
        out.extend(vectors);
    }
    Ok(out)
}

// ============ Hashed Provider ============

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric tokens are hashed (SHA-256) into `dims` buckets
/// and the counts are L2-normalized. Runs in-process with no model
/// download. Texts sharing vocabulary land close together, which is enough
/// for offline use and reproducible tests.
#[derive(Debug, Clone)]
pub struct HashedProvider {
    model: String,
    dims: usize,
}

impl HashedProvider {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            model: format!("hashed-{}", dims),
            dims,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashedProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|t| hashed_embedding(t, self.dims))
            .collect())
    }
}

fn bucket(token: &str, dims: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(word) % dims as u64) as usize
}

/// Feature-hash `text` into a unit vector of length `dims`.
///
/// Text without alphanumeric tokens is hashed whole, so the result is never
/// the zero vector.
pub fn hashed_embedding(text: &str, dims: usize) -> Vec<f32> {
    let dims = dims.max(1);
    let mut vector = vec![0.0f32; dims];

    let mut tokens = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .peekable();
    if tokens.peek().is_none() {
        // Punctuation or symbol-only text still needs a direction, otherwise
        // it sits at distance 1.0 from everything including itself.
        vector[bucket(text.trim(), dims)] = 1.0;
        return vector;
    }

    for token in tokens {
        vector[bucket(&token.to_lowercase(), dims)] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use workspace_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`, accumulated in `f64`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Cosine distance, `1 - cosine_similarity`, in `[0.0, 2.0]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    (1.0 - cosine_similarity(a, b)).max(0.0)
}
