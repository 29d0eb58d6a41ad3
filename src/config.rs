//! Environment-based configuration.
//!
//! Every setting has a default except the Chroma and OpenAI credentials,
//! which stay `None` and fail at call time if the corresponding backend
//! is actually used. Chunking parameters are validated here, before any
//! I/O happens.

use anyhow::Result;

use crate::chunking::ChunkParams;

#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub bind_addr: String,
    /// Target chunk size in bytes.
    pub chunk_size: usize,
    /// Overlap carried between consecutive chunks, in bytes.
    pub overlap: usize,
    /// Default result count for semantic queries.
    pub n_results: usize,
    /// Vector store connection settings.
    pub chroma: ChromaConfig,
    /// Embedding / completion provider settings.
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct ChromaConfig {
    pub url: String,
    pub tenant: String,
    pub database: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL for the OpenAI-compatible API.
    pub base_url: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub chat_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            chunk_size: 1000,
            overlap: 200,
            n_results: 10,
            chroma: ChromaConfig {
                url: "https://api.trychroma.com".to_string(),
                tenant: "default_tenant".to_string(),
                database: "default_database".to_string(),
                api_key: None,
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com".to_string(),
                api_key: None,
                embedding_model: "text-embedding-3-small".to_string(),
                chat_model: "gpt-4o-mini".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults,
    /// and validate the chunking parameters.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REPODOCS_BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.chunk_size = env_usize("REPODOCS_CHUNK_SIZE", config.chunk_size)?;
        config.overlap = env_usize("REPODOCS_CHUNK_OVERLAP", config.overlap)?;
        config.n_results = env_usize("REPODOCS_N_RESULTS", config.n_results)?;

        if let Ok(url) = std::env::var("CHROMA_URL") {
            config.chroma.url = url;
        }
        if let Ok(tenant) = std::env::var("CHROMA_TENANT_ID") {
            config.chroma.tenant = tenant;
        }
        if let Ok(db) = std::env::var("CHROMA_DATABASE") {
            config.chroma.database = db;
        }
        if let Ok(key) = std::env::var("CHROMA_API_KEY") {
            config.chroma.api_key = Some(key);
        }

        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("REPODOCS_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(model) = std::env::var("REPODOCS_CHAT_MODEL") {
            config.llm.chat_model = model;
        }

        // Reject bad chunk parameters up front rather than on first index.
        config.chunk_params()?;

        Ok(config)
    }

    pub fn chunk_params(&self) -> Result<ChunkParams, crate::error::PipelineError> {
        ChunkParams::new(self.chunk_size, self.overlap)
    }
}

/// Read a numeric setting from the environment. An unset variable keeps
/// the current value; a set-but-unparseable one is a configuration error,
/// not a silent fallback.
fn env_usize(name: &str, current: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(val) => val.parse().map_err(|_| {
            crate::error::PipelineError::config(format!(
                "{name} must be a non-negative integer, got {val:?}"
            ))
            .into()
        }),
        Err(_) => Ok(current),
    }
}
