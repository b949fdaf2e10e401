use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RagError, Result};

/// Upper bound on web results per query accepted by the search provider.
pub const MAX_WEB_RESULTS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the vector index is persisted
    pub data_dir: PathBuf,
    /// Chat and embedding provider configuration
    pub llm: LlmConfig,
    /// Web search provider configuration
    pub search: SearchConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai" (any OpenAI-compatible API, e.g. Groq)
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer synthesis and query expansion
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
    /// Largest input, in estimated tokens, the embedding model accepts
    pub max_input_tokens: usize,
    pub embed_timeout_secs: u64,
    pub chat_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Results requested per query (1..=20)
    pub num_results: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Collection used when a request does not name one
    pub collection: String,
    pub top_k: usize,
    /// Number of model-generated query variants in addition to the original
    pub query_variants: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Character budget for the assembled context
    pub max_context_chars: usize,
    /// Retries after the first failed generation attempt
    pub max_retries: usize,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "all-minilm".to_string(),
            api_key: None,
            embedding_dim: 384,
            max_input_tokens: 512,
            embed_timeout_secs: 30,
            chat_timeout_secs: 60,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://google.serper.dev/search".to_string(),
            api_key: None,
            num_results: 5,
            timeout_secs: 10,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: "default_collection".to_string(),
            top_k: 10,
            query_variants: 3,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
            max_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

/// Token estimate for a text of `chars` characters, matching the embedder's check.
fn estimate_tokens_for_chars(chars: usize) -> usize {
    chars.div_ceil(crate::llm::embeddings::CHARS_PER_TOKEN)
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.parse() {
            *slot = v;
        }
    }
}

impl Config {
    /// Read `.env` (if present) and then the process environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("CEREBRO_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        env_parse("LLM_EMBEDDING_DIM", &mut config.llm.embedding_dim);
        env_parse("LLM_MAX_INPUT_TOKENS", &mut config.llm.max_input_tokens);
        env_parse("LLM_EMBED_TIMEOUT_SECS", &mut config.llm.embed_timeout_secs);
        env_parse("LLM_CHAT_TIMEOUT_SECS", &mut config.llm.chat_timeout_secs);

        if let Ok(key) = std::env::var("SERPER_API_KEY") {
            config.search.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("SERPER_SEARCH_URL") {
            config.search.endpoint = url;
        }
        env_parse("SEARCH_NUM_RESULTS", &mut config.search.num_results);
        env_parse("SEARCH_TIMEOUT_SECS", &mut config.search.timeout_secs);

        env_parse("CHUNK_MAX_CHARS", &mut config.chunking.max_chars);
        env_parse("CHUNK_OVERLAP_CHARS", &mut config.chunking.overlap_chars);

        if let Ok(name) = std::env::var("RETRIEVAL_COLLECTION") {
            config.retrieval.collection = name;
        }
        env_parse("RETRIEVAL_TOP_K", &mut config.retrieval.top_k);
        env_parse("RETRIEVAL_QUERY_VARIANTS", &mut config.retrieval.query_variants);

        env_parse("CONTEXT_MAX_CHARS", &mut config.synthesis.max_context_chars);
        env_parse("GENERATION_MAX_RETRIES", &mut config.synthesis.max_retries);

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 {
            return Err(RagError::Config("chunking.max_chars must be > 0".into()));
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return Err(RagError::Config(format!(
                "chunking.overlap_chars ({}) must be < max_chars ({})",
                self.chunking.overlap_chars, self.chunking.max_chars
            )));
        }
        let chunk_tokens = estimate_tokens_for_chars(self.chunking.max_chars);
        if chunk_tokens > self.llm.max_input_tokens {
            return Err(RagError::Config(format!(
                "chunking.max_chars ({}) is ~{chunk_tokens} tokens, above llm.max_input_tokens ({})",
                self.chunking.max_chars, self.llm.max_input_tokens
            )));
        }
        if !(1..=MAX_WEB_RESULTS).contains(&self.search.num_results) {
            return Err(RagError::Config(format!(
                "search.num_results must be within 1..={MAX_WEB_RESULTS}"
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be > 0".into()));
        }
        if self.synthesis.max_context_chars == 0 {
            return Err(RagError::Config(
                "synthesis.max_context_chars must be > 0".into(),
            ));
        }
        if self.llm.embedding_dim == 0 {
            return Err(RagError::Config("llm.embedding_dim must be > 0".into()));
        }
        Ok(())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}
