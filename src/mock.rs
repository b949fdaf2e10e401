//! Deterministic stand-ins for the external providers, for tests and offline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::llm::embeddings::EmbeddingProvider;
use crate::llm::GenerativeProvider;
use crate::models::{ChatMessage, SearchResult};
use crate::search::web::WebSearchProvider;

/// 64-bit FNV-1a; stable across runs and platforms.
fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Hashed bag-of-words embeddings, with optional fixed vectors per text.
pub struct MockEmbedder {
    dimension: usize,
    fixed: HashMap<String, Vec<f32>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fixed: HashMap::new(),
            fail: AtomicBool::new(false),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded. `vector` should
    /// have the mock's dimension; a mismatch is passed through unchanged, so
    /// [`crate::llm::embeddings::Embedder`] reports it as an embedding error.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.into(), vector);
        self
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.fixed.get(text) {
            return v.clone();
        }

        let mut v = vec![0.0f32; self.dimension];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for token in tokens {
            let bucket = (fnv1a(&token) % self.dimension as u64) as usize;
            v[bucket] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[(fnv1a(text) % self.dimension as u64) as usize] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Embedding("mock embedding model unavailable".into()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

enum Reply {
    Fixed(String),
    Echo,
    Fail,
}

/// Scripted chat model. `echo()` answers with a fixed template around the
/// context it was given, so assertions can check what reached the model.
pub struct MockGenerator {
    reply: Reply,
    failures_remaining: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockGenerator {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            failures_remaining: AtomicUsize::new(0),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with_reply(Reply::Fixed(text.into()))
    }

    pub fn echo() -> Self {
        Self::with_reply(Reply::Echo)
    }

    pub fn failing() -> Self {
        Self::with_reply(Reply::Fail)
    }

    /// Fail the first `n` calls before replying normally.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every message list received, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

fn echo_reply(messages: &[ChatMessage]) -> String {
    let user = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let context = user
        .strip_prefix("Context:\n")
        .and_then(|rest| rest.split("\n\nQuestion:").next())
        .unwrap_or(user);

    format!("Mock answer grounded in: {}", context.trim())
}

#[async_trait]
impl GenerativeProvider for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(messages.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(RagError::provider("mock", "scripted failure"));
        }

        match &self.reply {
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::Echo => Ok(echo_reply(messages)),
            Reply::Fail => Err(RagError::provider("mock", "model unavailable")),
        }
    }
}

/// Canned web search results, or a provider that always fails.
pub struct MockWebSearch {
    results: Vec<SearchResult>,
    fail: bool,
    calls: AtomicUsize,
    last_num: AtomicUsize,
}

impl MockWebSearch {
    pub fn with_results(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            fail: false,
            calls: AtomicUsize::new(0),
            last_num: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_results(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `num_results` passed on the most recent call.
    pub fn last_num(&self) -> usize {
        self.last_num.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchProvider for MockWebSearch {
    fn name(&self) -> &str {
        "mock-search"
    }

    async fn search(&self, _query: &str, num_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_num.store(num_results, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::provider("mock-search", "HTTP 503"));
        }
        Ok(self.results.iter().take(num_results).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_fixed_vector_wins() {
        let mock = MockEmbedder::new(3).with_vector("A", vec![1.0, 0.0, 0.0]);
        let out = mock.embed_batch(&["A".to_string()]).await.unwrap();
        assert_eq!(out[0], vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_fixed_vector_is_an_embedding_error() {
        use crate::config::LlmConfig;
        use crate::llm::embeddings::Embedder;
        use std::sync::Arc;

        let mock = MockEmbedder::new(3).with_vector("short", vec![1.0, 0.0]);
        let config = LlmConfig {
            embedding_dim: 3,
            ..LlmConfig::default()
        };
        let embedder = Embedder::load(Arc::new(mock), &config).await.unwrap();
        let err = embedder.embed_one("short").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_mock_embedder_never_zero() {
        let mock = MockEmbedder::new(4);
        let out = mock.embed_batch(&["".to_string(), "!!!".to_string()]).await.unwrap();
        assert!(out.iter().all(|v| v.iter().any(|x| *x != 0.0)));
    }

    #[tokio::test]
    async fn test_mock_generator_failing_first() {
        let generator = MockGenerator::fixed("ok").failing_first(2);
        assert!(generator.complete(&[]).await.is_err());
        assert!(generator.complete(&[]).await.is_err());
        assert_eq!(generator.complete(&[]).await.unwrap(), "ok");
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_echo_extracts_context() {
        let generator = MockGenerator::echo();
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("Context:\nParis is the capital of France.\n\nQuestion:\ncapital?"),
        ];
        let reply = generator.complete(&messages).await.unwrap();
        assert_eq!(reply, "Mock answer grounded in: Paris is the capital of France.");
    }
}
