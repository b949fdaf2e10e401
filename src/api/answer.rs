use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{AnswerRequest, AnswerResponse, Passage, UserIdentity};
use crate::state::AppState;
use crate::synthesis::{assemble_context, rank_evidence};

/// Answer `query` from web evidence and the default collection.
pub async fn answer(state: &AppState, query: &str, identity: &UserIdentity) -> Result<AnswerResponse> {
    answer_with(state, AnswerRequest::new(query, identity.clone())).await
}

/// Full answer pipeline:
///   1. Web search and semantic retrieval, concurrently
///   2. Rank evidence (web snippets, then passages) and fit it to the context budget
///   3. Generate the answer
///
/// Only generation failures (and a blank query) are returned as errors; a
/// failing evidence branch is logged and contributes nothing.
pub async fn answer_with(state: &AppState, req: AnswerRequest) -> Result<AnswerResponse> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(RagError::Config("Query is required".to_string()));
    }

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("answer", %request_id, user = %req.identity);

    async move {
        let collection = req
            .collection
            .clone()
            .unwrap_or_else(|| state.config.retrieval.collection.clone());

        let web_branch = async {
            if req.use_web {
                state.web.search(&query, state.config.search.num_results).await
            } else {
                Vec::new()
            }
        };
        let semantic_branch = async {
            if req.use_semantic {
                semantic_passages(state, &query, &collection, &req).await
            } else {
                Vec::new()
            }
        };

        let (evidence, passages) = tokio::join!(web_branch, semantic_branch);

        let ranked = rank_evidence(&evidence, &passages);
        let context = assemble_context(&ranked, state.synthesizer.max_context_chars());
        tracing::info!(
            web_hits = evidence.len(),
            passages = passages.len(),
            context_chars = context.chars().count(),
            "Evidence assembled"
        );

        let answer = state
            .synthesizer
            .synthesize(&query, &context)
            .await
            .inspect_err(|e| tracing::error!("Answer generation failed: {e}"))?;

        Ok::<_, RagError>(AnswerResponse {
            request_id,
            query: query.clone(),
            evidence,
            passages,
            answer,
            answered_at: Utc::now(),
        })
    }
    .instrument(span)
    .await
}

async fn semantic_passages(
    state: &AppState,
    query: &str,
    collection: &str,
    req: &AnswerRequest,
) -> Vec<Passage> {
    let Some(retriever) = state.retriever() else {
        tracing::debug!("Semantic search disabled, using web evidence only");
        return Vec::new();
    };

    match retriever
        .retrieve(
            query,
            collection,
            state.config.retrieval.top_k,
            &req.fallback_documents,
        )
        .await
    {
        Ok(passages) => passages,
        Err(e) => {
            tracing::warn!(collection, "Semantic retrieval failed: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mock::{MockEmbedder, MockGenerator, MockWebSearch};
    use crate::models::{Document, SearchResult};
    use crate::state::Providers;
    use std::sync::Arc;

    async fn state(
        dir: &std::path::Path,
        web: Arc<MockWebSearch>,
        generator: Arc<MockGenerator>,
    ) -> AppState {
        let mut config = Config {
            data_dir: dir.to_path_buf(),
            ..Config::default()
        };
        config.llm.embedding_dim = 32;
        config.retrieval.query_variants = 0;
        let providers = Providers {
            web,
            embedding: Arc::new(MockEmbedder::new(32)),
            generative: generator,
        };
        AppState::with_providers(config, providers).await.unwrap()
    }

    fn paris() -> SearchResult {
        SearchResult {
            title: "France".into(),
            link: "https://example.com/france".into(),
            snippet: "Paris is the capital of France.".into(),
        }
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(MockGenerator::echo());
        let state = state(dir.path(), Arc::new(MockWebSearch::with_results(vec![])), generator.clone()).await;
        let err = answer(&state, "   ", &UserIdentity::anonymous()).await.unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_web_disabled_skips_provider() {
        let dir = tempfile::tempdir().unwrap();
        let web = Arc::new(MockWebSearch::with_results(vec![paris()]));
        let state = state(dir.path(), web.clone(), Arc::new(MockGenerator::echo())).await;

        let mut req = AnswerRequest::new("capital of France", UserIdentity::anonymous());
        req.use_web = false;
        let resp = answer_with(&state, req).await.unwrap();
        assert_eq!(web.calls(), 0);
        assert!(resp.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_documents_feed_context() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(MockGenerator::echo());
        let state = state(
            dir.path(),
            Arc::new(MockWebSearch::failing()),
            generator.clone(),
        )
        .await;

        let mut req = AnswerRequest::new("capital of France", UserIdentity("alice".into()));
        req.collection = Some("geo".into());
        req.fallback_documents = vec![Document::new("atlas", "The capital of France is Paris.")];
        let resp = answer_with(&state, req).await.unwrap();

        assert!(resp.evidence.is_empty());
        assert_eq!(resp.passages.len(), 1);
        assert!(resp.answer.contains("Paris"));
    }

    #[tokio::test]
    async fn test_each_answer_gets_a_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(
            dir.path(),
            Arc::new(MockWebSearch::with_results(vec![paris()])),
            Arc::new(MockGenerator::echo()),
        )
        .await;
        let a = answer(&state, "q", &UserIdentity::anonymous()).await.unwrap();
        let b = answer(&state, "q", &UserIdentity::anonymous()).await.unwrap();
        assert_ne!(a.request_id, b.request_id);
    }
}
