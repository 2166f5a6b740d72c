//! Capabilities the orchestrator calls out to.

use crate::state::Document;
use async_trait::async_trait;
use crag_core::AppResult;

/// Verdict for one (question, document) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub relevant: bool,
}

/// One web search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub content: String,
    pub url: Option<String>,
    pub title: Option<String>,
}

impl SearchHit {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            url: None,
            title: None,
        }
    }
}

/// Candidate documents for a question. An empty result is not an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, question: &str) -> AppResult<Vec<Document>>;
}

/// Relevance classification of a single document.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, question: &str, document: &str) -> AppResult<Grade>;
}

/// Rewrites a question for web search. Returns non-empty text or an error.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, question: &str) -> AppResult<String>;
}

/// External search. Zero hits is not an error.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>>;
}

/// Produces the final answer. Must accept an empty document list.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, documents: &[Document]) -> AppResult<String>;
}
