//! Model-backed capabilities: embeddings, chat completion and query expansion.

pub mod chat;
pub mod embeddings;
pub mod query_expand;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ChatMessage;

/// A chat-style generative model returning a single completion.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with [`crate::error::RagError::Provider`] when the model is
    /// unreachable or rejects the request.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Remove chat-template control tokens so retrieved or user-supplied text
/// cannot open a new turn in the prompt.
pub fn sanitize_for_prompt(text: &str) -> String {
    const CONTROL_TOKENS: [&str; 4] = ["<|im_start|>", "<|im_end|>", "<|endoftext|>", "<|eot_id|>"];

    let mut out = text.to_string();
    // Removing one token can splice the remainder into another; repeat until stable.
    while CONTROL_TOKENS.iter().any(|t| out.contains(t)) {
        for token in CONTROL_TOKENS {
            out = out.replace(token, "");
        }
    }
    out
}
