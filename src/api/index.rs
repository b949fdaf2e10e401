use crate::error::{RagError, Result};
use crate::models::Document;
use crate::state::AppState;

/// Chunk, embed and store `documents` in `collection`. Returns the number of
/// chunks written. Fails with an embedding error when the semantic path is
/// disabled.
pub async fn index_documents(state: &AppState, collection: &str, documents: &[Document]) -> Result<usize> {
    let retriever = state.retriever().ok_or_else(|| {
        RagError::Embedding("semantic search is disabled: embedding model not loaded".to_string())
    })?;
    if collection.trim().is_empty() {
        return Err(RagError::Config("Collection name is required".to_string()));
    }
    retriever.index_documents(collection, documents).await
}
