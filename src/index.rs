//! Indexing pipeline: files → chunks → embeddings → vector store.
//!
//! One `index` call is one logical unit of work. Deterministic chunk ids
//! make the final upsert idempotent: re-indexing unchanged content
//! rewrites the same keys instead of appending.

use std::sync::Arc;

use crate::chunking::{chunk_files, ChunkParams};
use crate::error::PipelineError;
use crate::llm::embeddings::EmbeddingClient;
use crate::models::{FileRecord, IndexReport};
use crate::store::{collection_name, VectorStore};

pub struct Indexer {
    embedder: Arc<EmbeddingClient>,
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(embedder: Arc<EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Index a batch of loaded files into the repository's collection.
    ///
    /// Zero chunks (all files empty or skipped) short-circuits to a
    /// zero-count report without contacting the embedding or store
    /// backends.
    pub async fn index(
        &self,
        repo_id: &str,
        files: &[FileRecord],
        params: ChunkParams,
    ) -> Result<IndexReport, PipelineError> {
        let batch = chunk_files(repo_id, files, params)?;
        let files_skipped = batch.skipped.len();
        let files_indexed = files.len() - files_skipped;

        if batch.chunks.is_empty() {
            tracing::info!(repo_id, "nothing to index");
            return Ok(IndexReport {
                repo_id: repo_id.to_string(),
                collection_name: collection_name(repo_id),
                chunks_indexed: 0,
                files_indexed,
                files_skipped,
                indexed_at: chrono::Utc::now(),
            });
        }

        tracing::info!(
            repo_id,
            chunks = batch.chunks.len(),
            files = files_indexed,
            "embedding chunks"
        );

        let texts: Vec<String> = batch.chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let ids: Vec<String> = batch.chunks.iter().map(|c| c.chunk_id.clone()).collect();
        let metadatas: Vec<_> = batch.chunks.iter().map(|c| c.metadata.clone()).collect();

        let handle = self.store.collection(repo_id).await?;
        self.store
            .upsert(&handle, &ids, &vectors, &texts, &metadatas)
            .await?;

        tracing::info!(
            repo_id,
            collection = %handle.name,
            chunks = ids.len(),
            "index complete"
        );

        Ok(IndexReport {
            repo_id: repo_id.to_string(),
            collection_name: handle.name,
            chunks_indexed: ids.len(),
            files_indexed,
            files_skipped,
            indexed_at: chrono::Utc::now(),
        })
    }
}
