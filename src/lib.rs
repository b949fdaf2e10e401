//! # cerebro
//!
//! Answers natural-language questions by combining live web search with a
//! locally maintained semantic index, then asking a language model for an
//! answer grounded in that evidence.
//!
//! ## Architecture
//!
//! ```text
//!                          ┌─────────────┐
//!                          │  User Query  │
//!                          └──────┬───────┘
//!                                 │
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!        ┌────────────────┐              ┌────────────────┐
//!        │   Web Search   │              │ Query Expansion│
//!        │ (Serper, 1-20) │              │  (LLM: n alt)  │
//!        └───────┬────────┘              └───────┬────────┘
//!                │ snippets                      │ 1 + n queries
//!                │                               ▼
//!                │                      ┌────────────────┐
//!                │                      │ Embed variants │
//!                │                      └───────┬────────┘
//!                │                              ▼
//!                │                      ┌────────────────┐
//!                │                      │ Vector query   │
//!                │                      │ per variant    │
//!                │                      └───────┬────────┘
//!                │                              ▼
//!                │                      ┌────────────────┐
//!                │                      │ Dedupe (max),  │
//!                │                      │ sort, top-K    │
//!                │                      └───────┬────────┘
//!                └───────────────┬──────────────┘
//!                                ▼
//!                  ┌───────────────────────┐
//!                  │  Context assembly     │
//!                  │  web first, then      │
//!                  │  passages; drop tail  │
//!                  │  to fit char budget   │
//!                  └───────────┬───────────┘
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │  Answer synthesis     │
//!                  │  bounded retries      │
//!                  └───────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration (`.env` aware) with validation
//! - [`error`] - `RagError` taxonomy shared by every component
//! - [`models`] - Shared data types: `Document`, `Chunk`, `SearchResult`, `Passage`, answer request/response
//! - [`chunking`] - Overlapping character windows that prefer paragraph/sentence breaks
//! - [`llm::embeddings`] - Embedding provider trait, `Embedder` (limits, timeout, normalization), Ollama/OpenAI client
//! - [`llm::chat`] - Chat completions via Ollama or OpenAI-compatible APIs
//! - [`llm::query_expand`] - LLM-powered query expansion with graceful fallback
//! - [`search::vector`] - Persistent per-collection vector index with cosine similarity
//! - [`search::web`] - Web search provider trait, Serper client, degrading wrapper
//! - [`search::fusion`] - Merge of per-variant hit lists
//! - [`search::retriever`] - Expand → embed → query → merge → rank pipeline, lazy population
//! - [`synthesis`] - Context assembly and retrying answer generation
//! - [`api`] - `answer()` and `index_documents()` entry points
//! - [`state`] - Provider wiring and shared application state
//! - [`telemetry`] - `tracing` subscriber setup
//! - [`mock`] - Deterministic providers for tests and offline runs

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod llm;
pub mod mock;
pub mod models;
pub mod search;
pub mod state;
pub mod synthesis;
pub mod telemetry;
