use std::sync::Arc;
use std::time::Duration;

use crate::chunking::Chunker;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::llm::chat::LlmClient;
use crate::llm::embeddings::{Embedder, EmbeddingProvider, HttpEmbeddingProvider};
use crate::llm::query_expand::QueryExpander;
use crate::llm::GenerativeProvider;
use crate::search::retriever::Retriever;
use crate::search::vector::VectorIndex;
use crate::search::web::{SerperProvider, WebSearch, WebSearchProvider};
use crate::synthesis::Synthesizer;

/// The external capabilities the pipeline is built from.
#[derive(Clone)]
pub struct Providers {
    pub web: Arc<dyn WebSearchProvider>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub generative: Arc<dyn GenerativeProvider>,
}

impl Providers {
    /// Serper for web search, Ollama or an OpenAI-compatible API for models.
    pub fn production(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            web: Arc::new(SerperProvider::new(client.clone(), &config.search)),
            embedding: Arc::new(HttpEmbeddingProvider::new(client.clone(), config.llm.clone())),
            generative: Arc::new(LlmClient::new(client, config.llm.clone())),
        })
    }
}

/// Shared application state. Built once per process; cheap to clone.
///
/// The semantic path (`retriever`) is optional: when the embedding model or the
/// index cannot be brought up, answers fall back to web evidence only.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub web: WebSearch,
    pub synthesizer: Arc<Synthesizer>,
    retriever: Option<Arc<Retriever>>,
    index: Option<Arc<VectorIndex>>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let providers = Providers::production(&config)?;
        Self::with_providers(config, providers).await
    }

    pub async fn with_providers(config: Config, providers: Providers) -> Result<Self> {
        config.validate()?;

        tracing::info!("Data directory: {}", config.data_dir.display());
        tracing::info!(
            "LLM provider: {} ({}), web search: {}",
            config.llm.provider,
            config.llm.base_url,
            providers.web.name()
        );

        let web = WebSearch::new(
            providers.web,
            Duration::from_secs(config.search.timeout_secs),
        );
        let chat_timeout = Duration::from_secs(config.llm.chat_timeout_secs);
        let synthesizer = Synthesizer::new(
            providers.generative.clone(),
            &config.synthesis,
            chat_timeout,
        );

        let index = match VectorIndex::open_or_create(&config.index_dir()) {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                tracing::error!("Vector index unavailable, semantic search disabled: {e}");
                None
            }
        };

        let embedder = match Embedder::load(providers.embedding, &config.llm).await {
            Ok(embedder) => Some(Arc::new(embedder)),
            Err(e) => {
                tracing::error!("Embedding model failed to load, semantic search disabled: {e}");
                None
            }
        };

        let retriever = match (&index, embedder) {
            (Some(index), Some(embedder)) => Some(Arc::new(Retriever::new(
                Chunker::from_config(&config.chunking)?,
                embedder,
                index.clone(),
                QueryExpander::new(providers.generative, chat_timeout),
                config.retrieval.query_variants,
            ))),
            _ => None,
        };

        Ok(Self {
            config: Arc::new(config),
            web,
            synthesizer: Arc::new(synthesizer),
            retriever,
            index,
        })
    }

    /// `None` when the semantic path is disabled.
    pub fn retriever(&self) -> Option<&Retriever> {
        self.retriever.as_deref()
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_deref()
    }

    pub fn semantic_enabled(&self) -> bool {
        self.retriever.is_some()
    }

    /// Write any collection whose last persist failed. Call before exit.
    pub fn shutdown(&self) -> Result<()> {
        match &self.index {
            Some(index) => {
                index.flush()?;
                tracing::info!("Vector index flushed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
