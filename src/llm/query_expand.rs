use std::sync::Arc;
use std::time::Duration;

use crate::llm::{sanitize_for_prompt, GenerativeProvider};
use crate::models::ChatMessage;

/// Broadens recall by asking the model for alternative phrasings of a query.
pub struct QueryExpander {
    generator: Arc<dyn GenerativeProvider>,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(generator: Arc<dyn GenerativeProvider>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// The original query followed by up to `n_variants` model-generated
    /// alternatives. Never empty: any model failure degrades to `[query]`.
    pub async fn expand(&self, query: &str, n_variants: usize) -> Vec<String> {
        let mut queries = vec![query.to_string()];
        if n_variants == 0 {
            return queries;
        }

        let messages = vec![ChatMessage::user(build_prompt(query, n_variants))];
        let response =
            match tokio::time::timeout(self.timeout, self.generator.complete(&messages)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::warn!(query, "Query expansion failed: {e}");
                    return queries;
                }
                Err(_) => {
                    tracing::warn!(query, timeout = ?self.timeout, "Query expansion timed out");
                    return queries;
                }
            };

        for variant in parse_expanded_queries(&response, n_variants) {
            let duplicate = queries
                .iter()
                .any(|q| q.trim().eq_ignore_ascii_case(variant.trim()));
            if !duplicate {
                queries.push(variant);
            }
        }

        tracing::debug!(query, variants = ?&queries[1..], "Query expanded");
        queries
    }
}

fn build_prompt(query: &str, n_variants: usize) -> String {
    let query = sanitize_for_prompt(query);
    format!(
        "You are a search query expander. Given a question, generate exactly {n_variants} \
         alternative phrasings or closely related questions that capture different aspects \
         of the intent. The alternatives should help retrieve relevant passages that the \
         original wording might miss.\n\n\
         Original question: \"{query}\"\n\n\
         Respond with ONLY a JSON array of {n_variants} strings. No explanation.\n\
         Example: [\"alternative phrasing 1\", \"alternative phrasing 2\"]"
    )
}

/// Pull a JSON string array out of a model response, tolerating prose or
/// code fences around it. Malformed output yields no variants.
fn parse_expanded_queries(content: &str, limit: usize) -> Vec<String> {
    let json_str = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };

    match serde_json::from_str::<Vec<String>>(json_str) {
        Ok(queries) => queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(limit)
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to parse expanded queries: {e}. Raw: {content}");
            Vec::new()
        }
    }
}
