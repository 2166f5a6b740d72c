//! Run state threaded through the pipeline.

use serde::{Deserialize, Serialize};

/// A piece of evidence handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,

    /// Provenance (source path, chunk id, score, or `"web_search"`)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome of grading, read by the branch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebSearchDecision {
    Yes,
    No,
}

/// The record for one question. Each step consumes a state and returns the
/// next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Current question; replaced by the rewrite step
    pub question: String,

    /// Final answer, set only by the generate step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,

    /// Set once by grading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_web_search: Option<WebSearchDecision>,

    /// Evidence in insertion order
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl RunState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            generation: None,
            needs_web_search: None,
            documents: Vec::new(),
        }
    }

    /// Whether the terminal step has produced an answer.
    pub fn is_complete(&self) -> bool {
        self.generation.is_some()
    }
}
