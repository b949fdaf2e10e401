use std::sync::Arc;

use crate::chunking::Chunker;
use crate::error::{RagError, Result};
use crate::llm::embeddings::Embedder;
use crate::llm::query_expand::QueryExpander;
use crate::models::{Chunk, Document, Passage};
use crate::search::fusion::merge_variant_hits;
use crate::search::vector::{cosine_similarity, EntryMetadata, IndexEntry, VectorIndex};

/// Semantic retrieval over a named collection:
/// expand → embed → query per variant → merge → rank.
pub struct Retriever {
    chunker: Chunker,
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    expander: QueryExpander,
    query_variants: usize,
}

impl Retriever {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<Embedder>,
        index: Arc<VectorIndex>,
        expander: QueryExpander,
        query_variants: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            expander,
            query_variants,
        }
    }

    /// Chunk, embed and store `documents`. Chunks from a previous indexing of
    /// the same source are replaced. Returns the number of chunks written.
    pub async fn index_documents(&self, collection: &str, documents: &[Document]) -> Result<usize> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunker.windows(doc))
            .collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let written = chunks.len();
        let entries = to_entries(chunks, vectors);
        let index = self.index.clone();
        let name = collection.to_string();
        // Persisting rewrites the collection file; keep that off the async workers.
        tokio::task::spawn_blocking(move || index.replace_sources(&name, entries))
            .await
            .map_err(|e| RagError::index(collection, format!("index write task failed: {e}")))??;

        tracing::info!(
            collection,
            documents = documents.len(),
            chunks = written,
            "Indexed documents"
        );
        Ok(written)
    }

    /// Up to `top_k` passages for `query`, best first. An empty collection is
    /// populated from `fallback` first; with no fallback the result is empty.
    pub async fn retrieve(
        &self,
        query: &str,
        collection: &str,
        top_k: usize,
        fallback: &[Document],
    ) -> Result<Vec<Passage>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        if self.index.count(collection) == 0 {
            if fallback.is_empty() {
                tracing::info!(collection, "Collection is empty and no fallback documents were supplied");
                return Ok(Vec::new());
            }
            tracing::info!(collection, documents = fallback.len(), "Populating empty collection");
            self.index_documents(collection, fallback).await?;
        }

        let variants = self.embeddable_variants(query).await;
        let vectors = self.embedder.embed(&variants).await?;

        let per_variant = vectors
            .iter()
            .map(|v| self.index.query(collection, v, top_k))
            .collect::<Result<Vec<_>>>()?;

        let passages = merge_variant_hits(&per_variant, top_k);
        tracing::debug!(
            collection,
            variants = variants.len(),
            passages = passages.len(),
            "Retrieved passages"
        );
        Ok(passages)
    }

    /// Expanded queries the embedding model can take. The original query is
    /// always kept so an over-long generated variant only costs its own recall.
    async fn embeddable_variants(&self, query: &str) -> Vec<String> {
        let mut variants = self.expander.expand(query, self.query_variants).await;
        let generated = variants.split_off(1);
        for variant in generated {
            if self.embedder.accepts(&variant) {
                variants.push(variant);
            } else {
                tracing::warn!(
                    query,
                    variant_chars = variant.chars().count(),
                    "Dropping query variant over the embedding input limit"
                );
            }
        }
        variants
    }

    /// Rank ad-hoc texts against `query` without touching the index.
    pub async fn rank_documents(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<Passage>> {
        if documents.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query).await?;
        let doc_vectors = self.embedder.embed(documents).await?;

        let mut ranked: Vec<Passage> = documents
            .iter()
            .zip(&doc_vectors)
            .enumerate()
            .map(|(i, (text, vector))| Passage {
                text: text.clone(),
                source: format!("doc_{i}"),
                score: cosine_similarity(&query_vector, vector),
            })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

fn to_entries(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Vec<IndexEntry> {
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry {
            id: Some(chunk.id()),
            text: chunk.text,
            vector,
            metadata: EntryMetadata {
                source: chunk.source,
            },
        })
        .collect()
}
