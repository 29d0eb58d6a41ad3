//! Vector store abstraction.
//!
//! The pipeline treats the vector store as an opaque keyed collection:
//! one collection per repository (named `repo_{id}`), entries keyed by
//! chunk id, supporting upsert, nearest-neighbor query, and unranked
//! metadata-filtered fetch. [`ChromaStore`](chroma::ChromaStore) talks to
//! a Chroma deployment over HTTP; [`MemoryStore`](memory::MemoryStore) is
//! a brute-force in-process implementation used by tests.

pub mod chroma;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Handle to one repository's collection.
///
/// Cheap to clone; `backend_ref` is whatever the backing store needs to
/// address the collection (a UUID for Chroma, the name for memory).
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    pub repo_id: String,
    pub name: String,
    pub backend_ref: String,
}

/// An entry returned by unranked fetch.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: String,
    pub document: String,
    pub metadata: Value,
}

/// A nearest-neighbor hit, ordered by ascending distance.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Value,
    pub distance: f32,
}

/// Collection naming convention shared by all backends.
pub fn collection_name(repo_id: &str) -> String {
    format!("repo_{repo_id}")
}

/// Abstract vector store backend.
///
/// Connectivity and auth failures surface as
/// [`PipelineError::StoreUnavailable`] and are never retried here.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get-or-create the collection for a repository.
    ///
    /// Idempotent; handles are cached per `repo_id` for the process
    /// lifetime, so repeated calls do not re-create the collection.
    async fn collection(&self, repo_id: &str) -> Result<CollectionHandle, PipelineError>;

    /// Write a batch of entries keyed by id, replacing prior entries that
    /// share an id. All four sequences must be equal length.
    async fn upsert(
        &self,
        handle: &CollectionHandle,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Map<String, Value>],
    ) -> Result<(), PipelineError>;

    /// Up to `n_results` nearest neighbors by vector distance, optionally
    /// restricted to entries matching the equality `filter`. An empty
    /// collection yields an empty list, not an error.
    async fn query(
        &self,
        handle: &CollectionHandle,
        query_vector: &[f32],
        n_results: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<QueryHit>, PipelineError>;

    /// Unranked fetch of all entries, optionally filtered. Used for file
    /// listing and full-file reconstruction.
    async fn fetch(
        &self,
        handle: &CollectionHandle,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<StoredEntry>, PipelineError>;
}

/// Shared upsert precondition: ids, vectors, documents, and metadatas
/// must line up 1:1.
pub(crate) fn check_upsert_lengths(
    ids: &[String],
    vectors: &[Vec<f32>],
    documents: &[String],
    metadatas: &[Map<String, Value>],
) -> Result<(), PipelineError> {
    let n = ids.len();
    if vectors.len() != n || documents.len() != n || metadatas.len() != n {
        return Err(PipelineError::config(format!(
            "upsert length mismatch: {} ids, {} vectors, {} documents, {} metadatas",
            n,
            vectors.len(),
            documents.len(),
            metadatas.len()
        )));
    }
    Ok(())
}
