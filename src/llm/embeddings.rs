//! Batched embedding generation with rate-limit retry.
//!
//! [`EmbeddingClient`] partitions input texts into batches of at most
//! [`EMBED_BATCH_SIZE`], sends each batch to an [`EmbeddingBackend`], and
//! concatenates the results in input order. Batches within one call run
//! strictly sequentially; indexing is not latency-critical and sequential
//! batches keep ordering trivially correct.
//!
//! Retry applies only to rate-limit failures: exponential backoff of
//! `2^attempt` seconds (1, 2, 4, 8, 16s ceiling), attempt counter local
//! to the batch. Any other backend failure aborts immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Maximum texts per backend request. The OpenAI embeddings API accepts
/// up to 2048 inputs per call; 100 keeps request bodies small.
pub const EMBED_BATCH_SIZE: usize = 100;

/// Default number of attempts per batch before giving up on rate limits.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// A failure reported by an embedding backend.
#[derive(Debug)]
pub enum BackendError {
    /// The backend throttled the request; retriable.
    RateLimited(String),
    /// Anything else; fatal for the enclosing operation.
    Other(String),
}

/// One remote embedding call: `(model, inputs)` to vectors, 1:1 in order.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn create(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, BackendError>;
}

/// Embedding client: batching, retry, and response invariants over a
/// pluggable backend.
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    model: String,
    max_retries: u32,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a batch of texts, preserving input order 1:1.
    ///
    /// `embed(&[])` returns an empty vector without contacting the backend.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            let vectors = self.embed_batch_with_retry(batch_index, batch).await?;

            if vectors.len() != batch.len() {
                return Err(PipelineError::ResponseSizeMismatch {
                    batch: batch_index,
                    sent: batch.len(),
                    got: vectors.len(),
                });
            }

            all.extend(vectors);
        }

        Ok(all)
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| PipelineError::EmbeddingBackend("empty embedding response".into()))
    }

    async fn embed_batch_with_retry(
        &self,
        batch_index: usize,
        batch: &[String],
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        for attempt in 0..self.max_retries {
            match self.backend.create(&self.model, batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(BackendError::RateLimited(msg)) => {
                    if attempt + 1 == self.max_retries {
                        break;
                    }
                    // 1s, 2s, 4s, 8s, 16s ceiling.
                    let delay = Duration::from_secs(1 << attempt.min(4));
                    tracing::warn!(
                        batch = batch_index,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "embedding rate limited, backing off: {msg}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(BackendError::Other(msg)) => {
                    return Err(PipelineError::EmbeddingBackend(msg));
                }
            }
        }

        Err(PipelineError::RateLimitExceeded {
            batch: batch_index,
            attempts: self.max_retries,
        })
    }
}

// ── OpenAI-compatible backend ────────────────────────────

/// Backend for `POST {base_url}/v1/embeddings`.
pub struct OpenAiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Deserialize)]
struct EmbedItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    async fn create(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let mut req = self.http.post(&url).json(&EmbedRequest { model, input: inputs });
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| BackendError::Other(format!("embeddings request failed: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::RateLimited(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Other(format!(
                "embeddings API returned {status}: {body}"
            )));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Other(format!("invalid embeddings response: {e}")))?;

        // Responses carry an index per item; sort so output order always
        // matches input order regardless of wire order.
        let mut data = body.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted backend: pops one outcome per call; `Ok(dim)` embeds each
    /// text as `[call_no; dim]` so ordering bugs are visible.
    struct ScriptedBackend {
        script: Mutex<Vec<Result<(), BackendError>>>,
        calls: AtomicUsize,
        sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<(), BackendError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                sizes: Mutex::new(Vec::new()),
            }
        }

        fn ok() -> Result<(), BackendError> {
            Ok(())
        }

        fn rate_limited() -> Result<(), BackendError> {
            Err(BackendError::RateLimited("429".into()))
        }
    }

    #[async_trait]
    impl EmbeddingBackend for ScriptedBackend {
        async fn create(
            &self,
            _model: &str,
            inputs: &[String],
        ) -> Result<Vec<Vec<f32>>, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.sizes.lock().unwrap().push(inputs.len());
            let outcome = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    Ok(())
                } else {
                    script.remove(0)
                }
            };
            outcome?;
            Ok(inputs
                .iter()
                .enumerate()
                .map(|(i, _)| vec![call as f32, i as f32])
                .collect())
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    #[tokio::test]
    async fn test_embed_empty_is_empty_without_backend_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let client = EmbeddingClient::new(backend.clone(), "test-model");
        let out = client.embed(&[]).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embed_batches_of_100_preserve_order() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let client = EmbeddingClient::new(backend.clone(), "test-model");
        let out = client.embed(&texts(250)).await.unwrap();
        assert_eq!(out.len(), 250);
        assert_eq!(*backend.sizes.lock().unwrap(), vec![100, 100, 50]);
        // First vector of each batch is [batch_no, 0].
        assert_eq!(out[0], vec![0.0, 0.0]);
        assert_eq!(out[100], vec![1.0, 0.0]);
        assert_eq!(out[200], vec![2.0, 0.0]);
        assert_eq!(out[249], vec![2.0, 49.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success_returns_full_result() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ScriptedBackend::rate_limited(),
            ScriptedBackend::rate_limited(),
            ScriptedBackend::ok(),
        ]));
        let client = EmbeddingClient::new(backend.clone(), "test-model");
        let out = client.embed(&texts(5)).await.unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_names_batch() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ScriptedBackend::ok(), // batch 0 succeeds
            ScriptedBackend::rate_limited(),
            ScriptedBackend::rate_limited(),
            ScriptedBackend::rate_limited(),
        ]));
        let client = EmbeddingClient::new(backend, "test-model").with_max_retries(3);
        let err = client.embed(&texts(150)).await.unwrap_err();
        match err {
            PipelineError::RateLimitExceeded { batch, attempts } => {
                assert_eq!(batch, 1);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_rate_limit_failure_aborts_immediately() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(BackendError::Other(
            "500 boom".into(),
        ))]));
        let client = EmbeddingClient::new(backend.clone(), "test-model");
        let err = client.embed(&texts(3)).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingBackend(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_response_size_mismatch_is_fatal() {
        struct ShortBackend;

        #[async_trait]
        impl EmbeddingBackend for ShortBackend {
            async fn create(
                &self,
                _model: &str,
                inputs: &[String],
            ) -> Result<Vec<Vec<f32>>, BackendError> {
                Ok(vec![vec![0.0]; inputs.len().saturating_sub(1)])
            }
        }

        let client = EmbeddingClient::new(Arc::new(ShortBackend), "test-model");
        let err = client.embed(&texts(4)).await.unwrap_err();
        match err {
            PipelineError::ResponseSizeMismatch { batch, sent, got } => {
                assert_eq!(batch, 0);
                assert_eq!(sent, 4);
                assert_eq!(got, 3);
            }
            other => panic!("expected ResponseSizeMismatch, got {other:?}"),
        }
    }
}
