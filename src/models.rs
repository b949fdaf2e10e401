use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw text handed in for indexing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A bounded window of a document's text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub source: String,
    pub index: usize,
    pub text: String,
    /// Char offset (not byte) of the first character in the parent document.
    pub start: usize,
    /// Char offset one past the last character.
    pub end: usize,
}

impl Chunk {
    /// Stable id used for overwrite-on-reindex.
    pub fn id(&self) -> String {
        format!("{}#{}", self.source, self.index)
    }

    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// A single organic web search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// A chunk returned by semantic retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// A single chat turn sent to a generative provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Already-authenticated caller identity, used only for attribution in logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity(pub String);

impl UserIdentity {
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full-control answer request
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub query: String,
    pub identity: UserIdentity,
    /// Collection for the semantic path; the configured default when `None`
    pub collection: Option<String>,
    /// Indexed on demand when the collection is empty
    pub fallback_documents: Vec<Document>,
    pub use_web: bool,
    pub use_semantic: bool,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>, identity: UserIdentity) -> Self {
        Self {
            query: query.into(),
            identity,
            collection: None,
            fallback_documents: Vec::new(),
            use_web: true,
            use_semantic: true,
        }
    }
}

/// Answer plus the evidence it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub request_id: Uuid,
    pub query: String,
    /// Web results in provider order
    pub evidence: Vec<SearchResult>,
    /// Retrieved chunks, highest score first
    pub passages: Vec<Passage>,
    pub answer: String,
    pub answered_at: DateTime<Utc>,
}
