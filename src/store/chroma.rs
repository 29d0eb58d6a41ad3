//! Chroma-backed [`VectorStore`] over the v2 REST API.
//!
//! One Chroma collection per repository, named `repo_{id}` and created
//! lazily on first access. Handles are cached per `repo_id` for the
//! process lifetime behind an async mutex, so two concurrent first
//! accesses cannot race the get-or-create call.
//!
//! Connectivity, auth, and non-success responses all map to
//! [`PipelineError::StoreUnavailable`]; this layer never retries.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::config::ChromaConfig;
use crate::error::PipelineError;

use super::{
    check_upsert_lengths, collection_name, CollectionHandle, QueryHit, StoredEntry, VectorStore,
};

pub struct ChromaStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    handles: Mutex<HashMap<String, CollectionHandle>>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<Value>>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
}

#[derive(Deserialize, Default)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Vec<Option<String>>,
    #[serde(default)]
    metadatas: Vec<Option<Value>>,
}

impl ChromaStore {
    pub fn new(http: reqwest::Client, config: &ChromaConfig) -> Self {
        let base_url = format!(
            "{}/api/v2/tenants/{}/databases/{}",
            config.url.trim_end_matches('/'),
            config.tenant,
            config.database
        );
        Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, PipelineError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            req = req.header("X-Chroma-Token", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("POST {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::StoreUnavailable(format!(
                "POST {url} returned {status}: {body}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn collection(&self, repo_id: &str) -> Result<CollectionHandle, PipelineError> {
        if repo_id.trim().is_empty() {
            return Err(PipelineError::config("repo_id must not be empty"));
        }

        // Lock held across the remote call: first caller creates, the
        // rest wait and reuse the cached handle.
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(repo_id) {
            return Ok(handle.clone());
        }

        let name = collection_name(repo_id);
        let resp = self
            .post(
                "/collections",
                &json!({ "name": name, "get_or_create": true }),
            )
            .await?;

        let created: CollectionResponse = resp.json().await.map_err(|e| {
            PipelineError::StoreUnavailable(format!("invalid collection response: {e}"))
        })?;

        let handle = CollectionHandle {
            repo_id: repo_id.to_string(),
            name,
            backend_ref: created.id,
        };
        handles.insert(repo_id.to_string(), handle.clone());
        Ok(handle)
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
        if ids.is_empty() {
            return Ok(());
        }

        self.post(
            &format!("/collections/{}/upsert", handle.backend_ref),
            &json!({
                "ids": ids,
                "embeddings": vectors,
                "documents": documents,
                "metadatas": metadatas,
            }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        handle: &CollectionHandle,
        query_vector: &[f32],
        n_results: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<QueryHit>, PipelineError> {
        let mut body = json!({
            "query_embeddings": [query_vector],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(conditions) = filter {
            body["where"] = Value::Object(conditions.clone());
        }

        let resp = self
            .post(&format!("/collections/{}/query", handle.backend_ref), &body)
            .await?;

        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("invalid query response: {e}")))?;

        // Responses are lists-of-lists, one inner list per query vector;
        // we always send exactly one.
        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let metadatas = parsed.metadatas.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();

        let mut hits = Vec::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            hits.push(QueryHit {
                id,
                document: documents
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or_default(),
                metadata: metadatas
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or(Value::Null),
                distance: distances.get(i).copied().unwrap_or(0.0),
            });
        }
        Ok(hits)
    }

    async fn fetch(
        &self,
        handle: &CollectionHandle,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<StoredEntry>, PipelineError> {
        let mut body = json!({ "include": ["documents", "metadatas"] });
        if let Some(conditions) = filter {
            body["where"] = Value::Object(conditions.clone());
        }

        let resp = self
            .post(&format!("/collections/{}/get", handle.backend_ref), &body)
            .await?;

        let parsed: GetResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("invalid get response: {e}")))?;

        let mut entries = Vec::with_capacity(parsed.ids.len());
        for (i, id) in parsed.ids.into_iter().enumerate() {
            entries.push(StoredEntry {
                id,
                document: parsed
                    .documents
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or_default(),
                metadata: parsed
                    .metadatas
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or(Value::Null),
            });
        }
        Ok(entries)
    }
}
