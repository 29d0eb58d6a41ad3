//! repodocs: repository ingestion, chunking, embedding, and semantic
//! retrieval behind an HTTP API.
//!
//! The pipeline clones a git repository, splits its text files into
//! overlapping chunks, embeds them through an OpenAI-compatible backend,
//! and upserts them into a per-repository vector collection. On top of
//! that sit semantic search, file reconstruction, retrieval-augmented
//! question answering, and documentation generation.

pub mod api;
pub mod chunking;
pub mod config;
pub mod docs;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod state;
pub mod store;
