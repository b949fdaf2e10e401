use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};

/// Rough characters-per-token ratio used to enforce the model's input limit
/// without loading its tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

const PROBE_TEXT: &str = "embedding model probe";

/// Maps text to dense vectors. One output vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Estimated token count for `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Scale `vector` to unit length. Zero vectors have no direction and are rejected.
pub fn l2_normalize(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(RagError::Embedding("model returned a zero or non-finite vector".into()));
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    Ok(vector)
}

/// A loaded embedding model: validates inputs, applies the call timeout and
/// normalizes outputs so cosine similarity equals the dot product.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    max_input_tokens: usize,
    timeout: Duration,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider.name())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl Embedder {
    /// Probe the provider once and pin the model dimension. Fails if the model
    /// is unreachable or its dimension disagrees with `config.embedding_dim`.
    pub async fn load(provider: Arc<dyn EmbeddingProvider>, config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.embed_timeout_secs);
        let probe = tokio::time::timeout(timeout, provider.embed_batch(&[PROBE_TEXT.to_string()]))
            .await
            .map_err(|_| {
                RagError::Embedding(format!("{} did not answer the load probe", provider.name()))
            })??;

        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| RagError::Embedding("load probe returned no vector".into()))?;

        if dimension != config.embedding_dim {
            return Err(RagError::Embedding(format!(
                "model {} produces {dimension}-dim vectors, configured for {}",
                provider.name(),
                config.embedding_dim
            )));
        }

        tracing::info!(provider = provider.name(), dimension, "Embedding model loaded");

        Ok(Self {
            provider,
            dimension,
            max_input_tokens: config.max_input_tokens,
            timeout,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether `text` is within the model's input limit.
    pub fn accepts(&self, text: &str) -> bool {
        estimate_tokens(text) <= self.max_input_tokens
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if let Some((i, text)) = texts.iter().enumerate().find(|(_, t)| !self.accepts(t)) {
            return Err(RagError::Embedding(format!(
                "input {i} is ~{} tokens, model limit is {}",
                estimate_tokens(text),
                self.max_input_tokens
            )));
        }

        let raw = tokio::time::timeout(self.timeout, self.provider.embed_batch(texts))
            .await
            .map_err(|_| {
                RagError::Embedding(format!(
                    "{} timed out after {:?}",
                    self.provider.name(),
                    self.timeout
                ))
            })??;

        if raw.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                raw.len()
            )));
        }

        raw.into_iter()
            .map(|v| {
                if v.len() != self.dimension {
                    return Err(RagError::Embedding(format!(
                        "vector has dimension {}, expected {}",
                        v.len(),
                        self.dimension
                    )));
                }
                l2_normalize(v)
            })
            .collect()
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("no embedding returned".into()))
    }
}

/// Embeddings over HTTP from Ollama or an OpenAI-compatible API.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbeddingProvider {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        &self.config.embedding_model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let result = match self.config.provider.as_str() {
            "ollama" => embed_ollama(&self.client, &self.config, texts).await,
            "openai" => embed_openai(&self.client, &self.config, texts).await,
            other => Err(anyhow::anyhow!("Unknown LLM provider: {other}")),
        };

        result.map_err(|e| RagError::Embedding(format!("{e:#}")))
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    /// Inputs are length-checked by `Embedder`; a 400 here means the limit is
    /// misconfigured, so surface it instead of truncating.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> anyhow::Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));

    let batch_size = 32;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OllamaEmbedRequest {
            model: config.embedding_model.clone(),
            input: chunk.to_vec(),
            truncate: false,
        };

        let resp = client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to call Ollama embed API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embed API returned {status}: {body}");
        }

        let body: OllamaEmbedResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama embed response")?;

        all_embeddings.extend(body.embeddings);
    }

    Ok(all_embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> anyhow::Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url.trim_end_matches('/'));
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let batch_size = 64;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OpenAiEmbedRequest {
            model: config.embedding_model.clone(),
            input: chunk.to_vec(),
        };

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .context("Failed to call OpenAI embed API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embed API returned {status}: {body}");
        }

        let body: OpenAiEmbedResponse = resp
            .json()
            .await
            .context("Failed to parse OpenAI embed response")?;

        // The API may return items out of order; `index` restores input order.
        let mut data = body.data;
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        all_embeddings.extend(data.into_iter().map(|d| d.embedding));
    }

    Ok(all_embeddings)
}
