//! Context assembly and answer generation.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SynthesisConfig;
use crate::error::{RagError, Result};
use crate::llm::{sanitize_for_prompt, GenerativeProvider};
use crate::models::{ChatMessage, Passage, SearchResult};

const SYSTEM_PROMPT: &str = "You are an advanced AI assistant designed to deliver accurate, \
     detailed, and well-structured responses. Your goal is to ensure clarity, precision, and \
     relevance in every answer. Base your answer on the provided context; if the context does \
     not contain the answer, say so.";

const NO_EVIDENCE: &str = "(No evidence was found for this question.)";

/// Evidence in rank order: web snippets as the provider ranked them, then
/// retrieved passages by descending score. Blank snippets are skipped.
pub fn rank_evidence(evidence: &[SearchResult], passages: &[Passage]) -> Vec<String> {
    evidence
        .iter()
        .map(|r| r.snippet.trim())
        .chain(passages.iter().map(|p| p.text.trim()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join `ranked` with newlines, keeping the longest prefix whose total length
/// (in chars) fits `max_chars`. Retained snippets are never cut.
pub fn assemble_context(ranked: &[String], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for (i, snippet) in ranked.iter().enumerate() {
        let separator = usize::from(i > 0);
        let len = snippet.chars().count();
        if used + separator + len > max_chars {
            tracing::debug!(
                kept = i,
                dropped = ranked.len() - i,
                max_chars,
                "Context budget reached"
            );
            break;
        }
        if separator == 1 {
            context.push('\n');
        }
        context.push_str(snippet);
        used += separator + len;
    }

    context
}

/// The chat turns sent for one answer. Query and context are scrubbed of
/// chat-template control tokens.
pub fn build_messages(query: &str, context: &str) -> Vec<ChatMessage> {
    let context = if context.trim().is_empty() {
        NO_EVIDENCE.to_string()
    } else {
        sanitize_for_prompt(context)
    };
    let query = sanitize_for_prompt(query);

    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Context:\n{context}\n\nQuestion:\n{query}\n\n\
             Craft a comprehensive and structured response that directly addresses the \
             question, fully utilizing the provided context."
        )),
    ]
}

/// Produces the final answer from a query and its assembled context.
pub struct Synthesizer {
    generator: Arc<dyn GenerativeProvider>,
    max_retries: usize,
    backoff: Duration,
    timeout: Duration,
    max_context_chars: usize,
}

impl Synthesizer {
    pub fn new(
        generator: Arc<dyn GenerativeProvider>,
        config: &SynthesisConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            timeout,
            max_context_chars: config.max_context_chars,
        }
    }

    pub fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// Generate an answer, retrying failed, timed-out or empty completions up
    /// to `max_retries` times. Never returns an empty answer.
    pub async fn synthesize(&self, query: &str, context: &str) -> Result<String> {
        let messages = build_messages(query, context);
        let attempts = self.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.timeout, self.generator.complete(&messages)).await {
                Ok(Ok(answer)) if !answer.trim().is_empty() => {
                    tracing::debug!(provider = self.generator.name(), attempt, "Answer generated");
                    return Ok(answer.trim().to_string());
                }
                Ok(Ok(_)) => last_error = "model returned an empty completion".to_string(),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {:?}", self.timeout),
            }

            tracing::warn!(
                provider = self.generator.name(),
                attempt,
                attempts,
                error = %last_error,
                "Generation attempt failed"
            );

            if attempt < attempts {
                tokio::time::sleep(self.backoff * attempt as u32).await;
            }
        }

        Err(RagError::Generation {
            attempts,
            message: last_error,
        })
    }
}
