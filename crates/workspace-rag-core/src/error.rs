//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Each stage surfaces its own typed failure; [`IngestError`] wraps them for
//! the orchestrator. None of the stages recover silently, and none of them
//! leave partial output behind when they fail.

use thiserror::Error;

/// Content extraction failures. Both are fatal for the file.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The declared type is outside the supported set.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The bytes do not parse as the declared type, or could only be
    /// partially processed.
    #[error("corrupt file: {0}")]
    CorruptFile(String),
}

/// Embedding generation failures.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// The provider failed. `retryable` is set for transient remote
    /// failures (rate limits, server errors, transport errors) so the
    /// caller can apply its own retry policy.
    #[error("embedding provider '{provider}' failed: {message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
    },

    /// A returned vector does not have the provider's declared dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The provider returned a different number of vectors than inputs.
    #[error("embedding count mismatch: sent {expected} texts, got {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding provider is disabled")]
    Disabled,
}

impl EmbedError {
    /// Build a non-retryable provider error.
    pub fn fatal(provider: &str, message: impl std::fmt::Display) -> Self {
        EmbedError::Provider {
            provider: provider.to_string(),
            message: message.to_string(),
            retryable: false,
        }
    }

    /// Build a retryable provider error.
    pub fn transient(provider: &str, message: impl std::fmt::Display) -> Self {
        EmbedError::Provider {
            provider: provider.to_string(),
            message: message.to_string(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedError::Provider {
                retryable: true,
                ..
            }
        )
    }
}

/// Store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A write was rejected; the whole file write has been rolled back.
    #[error("storage write failed: {0}")]
    Write(String),

    #[error("storage read failed: {0}")]
    Read(String),
}

impl StoreError {
    pub fn write(e: impl std::fmt::Display) -> Self {
        StoreError::Write(e.to_string())
    }

    pub fn read(e: impl std::fmt::Display) -> Self {
        StoreError::Read(e.to_string())
    }
}

/// Failure of a whole ingestion unit of work (one file).
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid chunking parameters: {0}")]
    InvalidChunkParams(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("file {0} has no storage location to reprocess from")]
    MissingStorageLocation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let err = ExtractError::UnsupportedFormat("video/mp4".to_string());
        assert_eq!(err.to_string(), "unsupported format: video/mp4");
    }

    #[test]
    fn transient_provider_error_is_retryable() {
        let err = EmbedError::transient("openai", "HTTP 429");
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "embedding provider 'openai' failed: HTTP 429"
        );
        assert!(!EmbedError::fatal("openai", "HTTP 401").is_retryable());
        assert!(!EmbedError::Disabled.is_retryable());
    }

    #[test]
    fn ingest_error_wraps_stage_errors_transparently() {
        let err: IngestError = StoreError::write("UNIQUE constraint failed").into();
        assert!(matches!(err, IngestError::Store(StoreError::Write(_))));
        assert_eq!(
            err.to_string(),
            "storage write failed: UNIQUE constraint failed"
        );

        let err: IngestError = ExtractError::CorruptFile("bad zip".to_string()).into();
        assert!(matches!(err, IngestError::Extract(_)));
    }

    #[test]
    fn file_too_large_display() {
        let err = IngestError::FileTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(err.to_string(), "file is 2048 bytes, limit is 1024 bytes");
    }
}
