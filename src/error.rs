use thiserror::Error;

/// Failure classes surfaced by the answer pipeline.
///
/// Only [`RagError::Generation`] is expected to reach an end user; the other
/// classes are degraded (and logged) by the component that observes them.
#[derive(Debug, Error)]
pub enum RagError {
    /// A web search or generative model provider was unreachable or rejected the request.
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// The embedding model is unavailable or an input could not be embedded.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The vector index could not be read or written.
    #[error("index error ({collection}): {message}")]
    Index { collection: String, message: String },

    /// Answer synthesis failed after exhausting its retries.
    #[error("generation failed after {attempts} attempt(s): {message}")]
    Generation { attempts: usize, message: String },

    /// A caller supplied invalid parameters or configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn index(collection: &str, message: impl Into<String>) -> Self {
        Self::Index {
            collection: collection.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
