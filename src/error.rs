//! Error taxonomy for the indexing and retrieval pipeline.
//!
//! Per-file problems during chunking are *not* represented here — they are
//! collected as skips in [`ChunkBatch`](crate::chunking::ChunkBatch) and the
//! batch continues. Everything in this enum aborts the enclosing operation
//! and propagates to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid chunking parameters or missing identifiers, rejected before
    /// any I/O is performed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding backend kept rate-limiting past the retry limit.
    #[error("embedding rate limit exceeded after {attempts} attempts (batch {batch})")]
    RateLimitExceeded { batch: usize, attempts: u32 },

    /// The embedding backend returned a different number of vectors than
    /// texts sent. Always fatal: retrying would not fix a contract breach,
    /// and continuing would misalign vectors with documents.
    #[error("embedding response size mismatch for batch {batch}: sent {sent}, got {got}")]
    ResponseSizeMismatch {
        batch: usize,
        sent: usize,
        got: usize,
    },

    /// Any non-rate-limit failure from the embedding backend.
    #[error("embedding backend error: {0}")]
    EmbeddingBackend(String),

    /// Vector store connectivity or auth failure. Never retried here.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// Chat completion failure during documentation generation or Q&A.
    #[error("completion backend error: {0}")]
    CompletionBackend(String),

    /// Repository clone or file loading failure.
    #[error("ingest error: {0}")]
    Ingest(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
