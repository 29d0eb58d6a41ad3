//! LLM backends: embedding generation and chat completion.
//!
//! Both talk to OpenAI-compatible HTTP APIs through the shared
//! `reqwest::Client`. The embedding path adds batching and rate-limit
//! retry; the completion path is a thin, non-retrying call used for
//! documentation generation and Q&A.

pub mod completion;
pub mod embeddings;
