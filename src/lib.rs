//! # Workspace RAG
//!
//! Workspace-scoped file ingestion and retrieval for retrieval-augmented
//! chat.
//!
//! Uploaded files (text, markdown, CSV/TSV, JSON, PDF, DOCX, PPTX, XLSX) go
//! through a per-file pipeline that extracts plain text, splits it into
//! overlapping chunks, embeds every chunk, and writes the file together with
//! its full chunk set in one transaction. Retrieval ranks a workspace's
//! chunks by cosine distance to an embedded query.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌──────────┐
//! │  Upload  │──▶│ Extract │──▶│  Chunk  │──▶│  Embed   │──▶│  SQLite  │
//! │  Event   │   │         │   │         │   │          │   │ files +  │
//! └──────────┘   └─────────┘   └─────────┘   └──────────┘   │file_items│
//!                                                           └────┬─────┘
//!                                                                ▼
//!                                                          ┌──────────┐
//!                                                          │ Retrieve │
//!                                                          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wrag init                                  # create database
//! wrag ingest ./docs --workspace acme        # ingest a directory
//! wrag search "refund policy" --workspace acme
//! wrag files --workspace acme
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Plain-text extraction per file kind |
//! | [`embedding`] | Remote and local embedding providers |
//! | [`pipeline`] | Per-file ingestion orchestration |
//! | [`sqlite_store`] | SQLite implementation of the store |
//! | [`uploads`] | Directory scanning for batch ingest |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Pure types, the chunker, ranking and the in-memory store live in the
//! `workspace-rag-core` crate.

pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod files;
pub mod ingest;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod uploads;
