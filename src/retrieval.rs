//! Semantic retrieval over indexed repositories.
//!
//! Queries embed the query text, ask the store for nearest neighbors, and
//! map distances to similarities (`similarity = 1 - distance`). "No
//! results" is a valid outcome everywhere here: empty collections and
//! unmatched filters return empty values, never errors.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::llm::embeddings::EmbeddingClient;
use crate::models::{FileEntry, QueryResult};
use crate::store::{StoredEntry, VectorStore};

pub struct Retriever {
    embedder: Arc<EmbeddingClient>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Rank a repository's chunks against a free-text query.
    pub async fn query_repository(
        &self,
        repo_id: &str,
        query_text: &str,
        n_results: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<QueryResult>, PipelineError> {
        let query_vector = self.embedder.embed_query(query_text).await?;
        let handle = self.store.collection(repo_id).await?;
        let hits = self
            .store
            .query(&handle, &query_vector, n_results, filter)
            .await?;

        tracing::info!(repo_id, results = hits.len(), "semantic query complete");

        Ok(hits
            .into_iter()
            .map(|hit| QueryResult {
                similarity: 1.0 - hit.distance,
                id: hit.id,
                document: hit.document,
                metadata: hit.metadata,
                distance: hit.distance,
            })
            .collect())
    }

    /// List the unique files in a repository's index, keeping first-seen
    /// metadata per path. File-level attributes are identical across a
    /// file's chunks by construction, so first-seen is as good as any.
    pub async fn list_files(&self, repo_id: &str) -> Result<Vec<FileEntry>, PipelineError> {
        let handle = self.store.collection(repo_id).await?;
        let entries = self.store.fetch(&handle, None).await?;

        let mut seen: Vec<String> = Vec::new();
        let mut files = Vec::new();
        for entry in &entries {
            let Some(path) = entry.metadata.get("file_path").and_then(Value::as_str) else {
                continue;
            };
            if seen.iter().any(|p| p == path) {
                continue;
            }
            seen.push(path.to_string());
            files.push(FileEntry {
                file_path: path.to_string(),
                file_name: metadata_str(&entry.metadata, "file_name"),
                language: metadata_str_or(&entry.metadata, "language", "unknown"),
                extension: metadata_str(&entry.metadata, "extension"),
            });
        }

        files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(files)
    }

    /// Reconstruct a file's full content from its stored chunks.
    ///
    /// Chunks are sorted by `chunk_index` and spliced on their recorded
    /// `start_offset`, so the overlap carried between consecutive chunks
    /// is emitted exactly once. A single-chunk file returns its chunk
    /// verbatim. An unknown path returns an empty string.
    pub async fn reconstruct_file(
        &self,
        repo_id: &str,
        file_path: &str,
    ) -> Result<String, PipelineError> {
        let handle = self.store.collection(repo_id).await?;
        let mut filter = Map::new();
        filter.insert("file_path".into(), Value::from(file_path));
        let entries = self.store.fetch(&handle, Some(&filter)).await?;

        if entries.is_empty() {
            tracing::warn!(repo_id, file_path, "no chunks found for file");
            return Ok(String::new());
        }

        let mut chunks: Vec<(usize, usize, StoredEntry)> = entries
            .into_iter()
            .map(|entry| {
                let index = metadata_usize(&entry.metadata, "chunk_index");
                let offset = metadata_usize(&entry.metadata, "start_offset");
                (index, offset, entry)
            })
            .collect();
        chunks.sort_by_key(|(index, _, _)| *index);

        if chunks.len() == 1 {
            return Ok(chunks.remove(0).2.document);
        }

        let mut content = String::new();
        let mut emitted = 0usize;
        for (_, offset, entry) in chunks {
            let skip = emitted.saturating_sub(offset).min(entry.document.len());
            content.push_str(&entry.document[skip..]);
            emitted = emitted.max(offset + entry.document.len());
        }
        Ok(content)
    }
}

fn metadata_str(metadata: &Value, key: &str) -> String {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn metadata_str_or(metadata: &Value, key: &str, default: &str) -> String {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn metadata_usize(metadata: &Value, key: &str) -> usize {
    metadata
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}
