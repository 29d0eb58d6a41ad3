//! Core data models for the indexing and retrieval pipeline.
//!
//! These types flow between ingestion, chunking, embedding, storage, and
//! the HTTP handlers. Chunk metadata is a flat JSON map of scalars so it
//! can pass through the vector store's `where` filters unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A loaded source file, produced once per ingestion run and discarded
/// after chunking.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Path relative to the repository root.
    pub source_path: String,
    /// Lossy-decoded UTF-8 content.
    pub content: String,
    pub metadata: FileMetadata,
}

/// File-level metadata attached to every chunk of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub extension: String,
    pub directory: String,
    pub line_count: usize,
    pub char_count: usize,
    pub language: String,
}

impl FileMetadata {
    /// Flatten into a JSON map for chunk metadata merging.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("file_name".into(), Value::from(self.file_name.clone()));
        map.insert("extension".into(), Value::from(self.extension.clone()));
        map.insert("directory".into(), Value::from(self.directory.clone()));
        map.insert("line_count".into(), Value::from(self.line_count));
        map.insert("char_count".into(), Value::from(self.char_count));
        map.insert("language".into(), Value::from(self.language.clone()));
        map
    }
}

/// One overlapping segment of a file, ready for embedding and storage.
///
/// `chunk_id` is a pure function of `(repo_id, file_path, chunk_index)`,
/// so re-chunking unchanged content recomputes the same ids and indexing
/// becomes an idempotent upsert.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub repo_id: String,
    pub file_path: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// A ranked hit from a semantic query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub document: String,
    pub metadata: Value,
    /// Distance reported by the store, ascending = better.
    pub distance: f32,
    /// `1 - distance`, descending = better.
    pub similarity: f32,
}

/// Summary returned after indexing one repository.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub repo_id: String,
    pub collection_name: String,
    pub chunks_indexed: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub indexed_at: chrono::DateTime<chrono::Utc>,
}

/// A unique file surfaced by `list_files`, carrying first-seen metadata.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub file_path: String,
    pub file_name: String,
    pub language: String,
    pub extension: String,
}

// ── HTTP request / response types ────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct IndexRequest {
    pub repo_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub repo_id: String,
    pub query: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    /// Optional metadata equality filter, e.g. `{"language": "rust"}`.
    pub filter: Option<Map<String, Value>>,
}

fn default_n_results() -> usize {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub repo_id: String,
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// A source chunk cited by an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub file_path: String,
    pub chunk_id: String,
    pub similarity: f32,
}
