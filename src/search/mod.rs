//! Evidence gathering: live web search and semantic retrieval over the vector index.

pub mod fusion;
pub mod retriever;
pub mod vector;
pub mod web;
