//! In-memory [`VectorStore`] implementation for tests.
//!
//! Collections are `HashMap`s behind a `std::sync::RwLock`; query is
//! brute-force cosine over every stored vector, reported as
//! `distance = 1 - cosine`, matching the convention the remote store uses.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::PipelineError;

use super::{
    check_upsert_lengths, collection_name, CollectionHandle, QueryHit, StoredEntry, VectorStore,
};

#[derive(Clone)]
struct MemoryEntry {
    vector: Vec<f32>,
    document: String,
    metadata: Map<String, Value>,
}

/// In-memory store keyed by collection name, then entry id.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, MemoryEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a repository's collection (test helper).
    pub fn entry_count(&self, repo_id: &str) -> usize {
        let collections = self.collections.read().unwrap();
        collections
            .get(&collection_name(repo_id))
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

fn matches_filter(metadata: &Map<String, Value>, filter: Option<&Map<String, Value>>) -> bool {
    match filter {
        None => true,
        Some(conditions) => conditions
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected)),
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn collection(&self, repo_id: &str) -> Result<CollectionHandle, PipelineError> {
        if repo_id.trim().is_empty() {
            return Err(PipelineError::config("repo_id must not be empty"));
        }
        let name = collection_name(repo_id);
        let mut collections = self.collections.write().unwrap();
        collections.entry(name.clone()).or_default();
        Ok(CollectionHandle {
            repo_id: repo_id.to_string(),
            name: name.clone(),
            backend_ref: name,
        })
    }

    async fn upsert(
        &self,
        handle: &CollectionHandle,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Map<String, Value>],
    ) -> Result<(), PipelineError> {
        check_upsert_lengths(ids, vectors, documents, metadatas)?;

        let mut collections = self.collections.write().unwrap();
        let collection = collections.entry(handle.name.clone()).or_default();
        for i in 0..ids.len() {
            collection.insert(
                ids[i].clone(),
                MemoryEntry {
                    vector: vectors[i].clone(),
                    document: documents[i].clone(),
                    metadata: metadatas[i].clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        handle: &CollectionHandle,
        query_vector: &[f32],
        n_results: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<QueryHit>, PipelineError> {
        let collections = self.collections.read().unwrap();
        let Some(collection) = collections.get(&handle.name) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<QueryHit> = collection
            .iter()
            .filter(|(_, entry)| matches_filter(&entry.metadata, filter))
            .map(|(id, entry)| QueryHit {
                id: id.clone(),
                document: entry.document.clone(),
                metadata: Value::Object(entry.metadata.clone()),
                distance: 1.0 - cosine_similarity(query_vector, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn fetch(
        &self,
        handle: &CollectionHandle,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<StoredEntry>, PipelineError> {
        let collections = self.collections.read().unwrap();
        let Some(collection) = collections.get(&handle.name) else {
            return Ok(Vec::new());
        };

        Ok(collection
            .iter()
            .filter(|(_, entry)| matches_filter(&entry.metadata, filter))
            .map(|(id, entry)| StoredEntry {
                id: id.clone(),
                document: entry.document.clone(),
                metadata: Value::Object(entry.metadata.clone()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn seeded() -> (MemoryStore, CollectionHandle) {
        let store = MemoryStore::new();
        let handle = store.collection("demo").await.unwrap();
        store
            .upsert(
                &handle,
                &["a".into(), "b".into(), "c".into()],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
                &["doc a".into(), "doc b".into(), "doc c".into()],
                &[
                    meta(&[("file_path", json!("src/a.rs"))]),
                    meta(&[("file_path", json!("src/b.rs"))]),
                    meta(&[("file_path", json!("src/a.rs"))]),
                ],
            )
            .await
            .unwrap();
        (store, handle)
    }

    #[tokio::test]
    async fn test_query_orders_by_ascending_distance() {
        let (store, handle) = seeded().await;
        let hits = store.query(&handle, &[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[tokio::test]
    async fn test_query_respects_filter_and_limit() {
        let (store, handle) = seeded().await;
        let filter = meta(&[("file_path", json!("src/a.rs"))]);
        let hits = store
            .query(&handle, &[1.0, 0.0], 1, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_query_empty_collection_returns_empty() {
        let store = MemoryStore::new();
        let handle = store.collection("empty").await.unwrap();
        let hits = store.query(&handle, &[1.0, 0.0], 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let (store, handle) = seeded().await;
        store
            .upsert(
                &handle,
                &["a".into()],
                &[vec![0.0, 1.0]],
                &["replaced".into()],
                &[Map::new()],
            )
            .await
            .unwrap();
        assert_eq!(store.entry_count("demo"), 3);
        let entries = store.fetch(&handle, None).await.unwrap();
        let a = entries.iter().find(|e| e.id == "a").unwrap();
        assert_eq!(a.document, "replaced");
    }

    #[tokio::test]
    async fn test_fetch_with_filter() {
        let (store, handle) = seeded().await;
        let filter = meta(&[("file_path", json!("src/a.rs"))]);
        let entries = store.fetch(&handle, Some(&filter)).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
