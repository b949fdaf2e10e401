use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{SearchConfig, MAX_WEB_RESULTS};
use crate::error::{RagError, Result};
use crate::models::SearchResult;

/// A ranked web search backend.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchResult>>;
}

/// Google results through the Serper API.
pub struct SerperProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchResult>,
}

impl SerperProvider {
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn call(&self, query: &str, num_results: usize) -> anyhow::Result<Vec<SearchResult>> {
        let mut req = self.client.post(&self.endpoint).json(&SerperRequest {
            q: query,
            num: num_results,
        });
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key);
        }

        let resp = req.send().await.context("Failed to call Serper search API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Serper search API returned {status}: {body}");
        }

        let body: SerperResponse = resp
            .json()
            .await
            .context("Failed to parse Serper search response")?;
        Ok(body.organic)
    }
}

#[async_trait]
impl WebSearchProvider for SerperProvider {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchResult>> {
        self.call(query, num_results)
            .await
            .map_err(|e| RagError::provider("serper", format!("{e:#}")))
    }
}

/// Single-attempt web search that never fails: provider errors and timeouts
/// are logged and reported as zero results.
#[derive(Clone)]
pub struct WebSearch {
    provider: Arc<dyn WebSearchProvider>,
    timeout: Duration,
}

impl WebSearch {
    pub fn new(provider: Arc<dyn WebSearchProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Up to `num_results` hits (clamped to 1..=20) in provider ranking order.
    pub async fn search(&self, query: &str, num_results: usize) -> Vec<SearchResult> {
        let num = num_results.clamp(1, MAX_WEB_RESULTS);
        if num != num_results {
            tracing::debug!(requested = num_results, clamped = num, "Clamped web result count");
        }

        match tokio::time::timeout(self.timeout, self.provider.search(query, num)).await {
            Ok(Ok(mut results)) => {
                results.truncate(num);
                tracing::info!(provider = self.provider.name(), query, hits = results.len(), "Web search");
                results
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = self.provider.name(), query, "Web search failed: {e}");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    query,
                    timeout = ?self.timeout,
                    "Web search timed out"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWebSearch;

    fn hit(n: usize) -> SearchResult {
        SearchResult {
            title: format!("t{n}"),
            link: format!("https://example.com/{n}"),
            snippet: format!("s{n}"),
        }
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty() {
        let search = WebSearch::new(Arc::new(MockWebSearch::failing()), Duration::from_secs(1));
        assert!(search.search("anything", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_preserves_provider_order() {
        let results: Vec<_> = (0..5).map(hit).collect();
        let search = WebSearch::new(
            Arc::new(MockWebSearch::with_results(results.clone())),
            Duration::from_secs(1),
        );
        assert_eq!(search.search("q", 5).await, results);
    }

    #[tokio::test]
    async fn test_num_results_is_clamped() {
        let mock = Arc::new(MockWebSearch::with_results((0..30).map(hit).collect()));
        let search = WebSearch::new(mock.clone(), Duration::from_secs(1));

        assert_eq!(search.search("q", 0).await.len(), 1);
        assert_eq!(mock.last_num(), 1);

        assert_eq!(search.search("q", 100).await.len(), MAX_WEB_RESULTS);
        assert_eq!(mock.last_num(), MAX_WEB_RESULTS);
    }

    #[test]
    fn test_serper_response_without_organic() {
        let body: SerperResponse = serde_json::from_str(r#"{"searchParameters":{}}"#).unwrap();
        assert!(body.organic.is_empty());
    }
}
