//! Deterministic stub components that count their invocations.

#![allow(dead_code)]

use async_trait::async_trait;
use crag_core::{AppError, AppResult};
use crag_engine::{
    Components, Document, Generator, Grade, Grader, Retriever, Rewriter, SearchHit, WebSearch,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Documents whose content starts with this prefix are graded not relevant.
pub const OFF_TOPIC: &str = "off-topic";

#[derive(Default)]
pub struct StubRetriever {
    pub docs: Vec<Document>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StubRetriever {
    pub fn returning(contents: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            docs: contents.iter().map(|c| Document::new(*c)).collect(),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(&self, _question: &str) -> AppResult<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.docs.clone())
    }
}

/// Returns one document quoting the question, so concurrent runs can be
/// told apart.
#[derive(Default)]
pub struct EchoRetriever;

#[async_trait]
impl Retriever for EchoRetriever {
    async fn retrieve(&self, question: &str) -> AppResult<Vec<Document>> {
        tokio::task::yield_now().await;
        Ok(vec![Document::new(format!("about {}", question))])
    }
}

#[derive(Default)]
pub struct StubGrader {
    /// Fail on this (zero-based) call
    pub fail_on_call: Option<usize>,
    /// Sleep longer for earlier documents to shuffle completion order
    pub staggered: bool,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubGrader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(call: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_on_call: Some(call),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Grader for StubGrader {
    async fn grade(&self, _question: &str, document: &str) -> AppResult<Grade> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            return Err(AppError::Llm("grader model unavailable".to_string()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.staggered {
            let delay = 40u64.saturating_sub(call as u64 * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(Grade {
            relevant: !document.starts_with(OFF_TOPIC),
        })
    }
}

pub struct StubRewriter {
    pub output: String,
    pub calls: AtomicUsize,
}

impl StubRewriter {
    pub fn returning(output: &str) -> Arc<Self> {
        Arc::new(Self {
            output: output.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rewriter for StubRewriter {
    async fn rewrite(&self, _question: &str) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

#[derive(Default)]
pub struct StubSearch {
    pub hits: Vec<String>,
    pub reject_credentials: bool,
    /// Fail once with a component error, then succeed
    pub fail_once: AtomicBool,
    pub calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn returning(hits: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            hits: hits.iter().map(|h| h.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        if self.reject_credentials {
            return Err(AppError::auth("tavily", "401 Unauthorized"));
        }
        if self.fail_once.swap(false, Ordering::SeqCst) {
            return Err(AppError::Search("connection reset".to_string()));
        }
        Ok(self.hits.iter().map(|h| SearchHit::new(h.clone())).collect())
    }
}

#[derive(Default)]
pub struct StubGenerator {
    pub calls: AtomicUsize,
    /// (question, document count) per call
    pub seen: Mutex<Vec<(String, usize)>>,
}

impl StubGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_seen(&self) -> (String, usize) {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, question: &str, documents: &[Document]) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((question.to_string(), documents.len()));
        Ok(format!(
            "Answer to '{}' from {} documents",
            question,
            documents.len()
        ))
    }
}

/// Handles to every stub behind a set of components.
pub struct Stubs {
    pub retriever: Arc<StubRetriever>,
    pub grader: Arc<StubGrader>,
    pub rewriter: Arc<StubRewriter>,
    pub search: Arc<StubSearch>,
    pub generator: Arc<StubGenerator>,
}

impl Stubs {
    pub fn new(docs: &[&str]) -> Self {
        Self {
            retriever: StubRetriever::returning(docs),
            grader: StubGrader::new(),
            rewriter: StubRewriter::returning("LangGraph framework overview"),
            search: StubSearch::returning(&["LangGraph is a library.", "It models agents as graphs."]),
            generator: StubGenerator::new(),
        }
    }

    pub fn components(&self) -> Components {
        Components {
            retriever: self.retriever.clone(),
            grader: self.grader.clone(),
            rewriter: self.rewriter.clone(),
            web_search: self.search.clone(),
            generator: self.generator.clone(),
        }
    }
}
