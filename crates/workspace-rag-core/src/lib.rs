//! # Workspace RAG Core
//!
//! Shared, I/O-free logic for Workspace RAG: data models, the sliding-window
//! chunker, the embedding provider trait, the store abstraction, the
//! retriever, and the typed error taxonomy.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP
//! dependencies. Content extraction, SQLite persistence, and remote
//! embedding providers live in the `workspace-rag` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod retrieve;
pub mod store;
