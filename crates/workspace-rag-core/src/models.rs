//! Core data models used throughout Workspace RAG.
//!
//! These types represent the files, chunks, and retrieval results that flow
//! through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_TSV: &str = "text/tab-separated-values";
pub const MIME_JSON: &str = "application/json";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Declared type of an uploaded file. The set is closed: anything else is
/// rejected with [`ExtractError::UnsupportedFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Markdown,
    Csv,
    Tsv,
    Json,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl FileKind {
    pub const ALL: [FileKind; 9] = [
        FileKind::Text,
        FileKind::Markdown,
        FileKind::Csv,
        FileKind::Tsv,
        FileKind::Json,
        FileKind::Pdf,
        FileKind::Docx,
        FileKind::Pptx,
        FileKind::Xlsx,
    ];

    /// Parse a declared type tag: a MIME type (`application/pdf`), an
    /// extension (`pdf`, `.pdf`), or a kind name (`markdown`).
    /// MIME parameters such as `; charset=utf-8` are ignored.
    pub fn parse(tag: &str) -> Result<Self, ExtractError> {
        let lowered = tag.trim().to_ascii_lowercase();
        let essence = lowered.split(';').next().unwrap_or("").trim();
        let essence = essence.trim_start_matches('.');

        let kind = match essence {
            MIME_TEXT | "txt" | "text" => FileKind::Text,
            MIME_MARKDOWN | "text/x-markdown" | "md" | "markdown" => FileKind::Markdown,
            MIME_CSV | "application/csv" | "csv" => FileKind::Csv,
            MIME_TSV | "tsv" => FileKind::Tsv,
            MIME_JSON | "text/json" | "json" => FileKind::Json,
            MIME_PDF | "pdf" => FileKind::Pdf,
            MIME_DOCX | "docx" => FileKind::Docx,
            MIME_PPTX | "pptx" => FileKind::Pptx,
            MIME_XLSX | "xlsx" => FileKind::Xlsx,
            _ => return Err(ExtractError::UnsupportedFormat(tag.to_string())),
        };
        Ok(kind)
    }

    /// Infer the kind from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self, ExtractError> {
        match name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => FileKind::parse(ext),
            _ => Err(ExtractError::UnsupportedFormat(name.to_string())),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            FileKind::Text => MIME_TEXT,
            FileKind::Markdown => MIME_MARKDOWN,
            FileKind::Csv => MIME_CSV,
            FileKind::Tsv => MIME_TSV,
            FileKind::Json => MIME_JSON,
            FileKind::Pdf => MIME_PDF,
            FileKind::Docx => MIME_DOCX,
            FileKind::Pptx => MIME_PPTX,
            FileKind::Xlsx => MIME_XLSX,
        }
    }

    /// Short stable name, used in the `files.kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Text => "text",
            FileKind::Markdown => "markdown",
            FileKind::Csv => "csv",
            FileKind::Tsv => "tsv",
            FileKind::Json => "json",
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Pptx => "pptx",
            FileKind::Xlsx => "xlsx",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub kind: FileKind,
    /// Where the raw bytes live; used to reprocess the file.
    pub storage_path: Option<String>,
    pub size_bytes: i64,
    /// SHA-256 of the raw bytes.
    pub content_hash: String,
    /// Model that embedded the current chunk set.
    pub embedding_model: String,
    pub embedding_dims: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A bounded span of one file's extracted text, with its embedding.
///
/// Stored as a `file_items` row keyed by `(file_id, chunk_index)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileItem {
    pub id: String,
    pub file_id: String,
    /// Denormalized from the parent file for query scoping.
    pub workspace_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// Character offsets of this chunk in the extracted text.
    pub char_start: i64,
    pub char_end: i64,
    /// Character count of `content`, not a model token count. The name
    /// matches the `file_items.tokens` column.
    pub tokens: i64,
    /// SHA-256 of `content`.
    pub hash: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
}

impl FileItem {
    pub fn dims(&self) -> usize {
        self.embedding.len()
    }
}

/// A stored vector eligible for a retrieval query, as handed from a
/// [`Store`](crate::store::Store) to the retriever.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub item_id: String,
    pub file_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// Insertion sequence; lower means inserted earlier.
    pub seq: i64,
    pub embedding: Vec<f32>,
}

/// A ranked retrieval result, consumed by prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub item_id: String,
    pub file_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// Cosine distance to the query, in `[0.0, 2.0]`.
    pub distance: f64,
}

/// Per-workspace counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceStats {
    pub workspace_id: String,
    pub files: i64,
    pub chunks: i64,
    pub characters: i64,
    /// `(model, chunk count)` pairs, sorted by model name.
    pub models: Vec<(String, i64)>,
}
