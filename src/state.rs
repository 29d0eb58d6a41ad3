//! Shared application state handed to every HTTP handler.

use std::sync::Arc;

use crate::config::Config;
use crate::docs::DocGenerator;
use crate::index::Indexer;
use crate::llm::completion::CompletionClient;
use crate::llm::embeddings::{EmbeddingClient, OpenAiBackend};
use crate::retrieval::Retriever;
use crate::store::chroma::ChromaStore;
use crate::store::VectorStore;

/// Long-lived clients and pipeline components, built once at startup and
/// cloned cheaply into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub indexer: Arc<Indexer>,
    pub retriever: Arc<Retriever>,
    pub docs: Arc<DocGenerator>,
}

impl AppState {
    /// Wires the production stack: OpenAI-compatible embeddings and chat
    /// plus a Chroma-backed vector store, all sharing one HTTP client.
    pub fn from_config(config: Config) -> Self {
        let http = reqwest::Client::new();
        let backend = Arc::new(OpenAiBackend::new(
            http.clone(),
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
        ));
        let embedder = Arc::new(EmbeddingClient::new(
            backend,
            config.llm.embedding_model.clone(),
        ));
        let completion = Arc::new(CompletionClient::new(
            http.clone(),
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
            config.llm.chat_model.clone(),
        ));
        let store: Arc<dyn VectorStore> = Arc::new(ChromaStore::new(http, &config.chroma));
        Self::with_components(config, embedder, completion, store)
    }

    /// Assembles state from pre-built components. Tests use this to swap
    /// in an in-memory store and a scripted embedding backend.
    pub fn with_components(
        config: Config,
        embedder: Arc<EmbeddingClient>,
        completion: Arc<CompletionClient>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let retriever = Arc::new(Retriever::new(embedder.clone(), store.clone()));
        let indexer = Arc::new(Indexer::new(embedder, store));
        let docs = Arc::new(DocGenerator::new(retriever.clone(), completion));
        Self {
            config: Arc::new(config),
            indexer,
            retriever,
            docs,
        }
    }
}
