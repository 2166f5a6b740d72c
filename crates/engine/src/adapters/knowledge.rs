//! Retriever over a local knowledge base.

use crate::components::Retriever;
use crate::state::Document;
use async_trait::async_trait;
use crag_core::AppResult;
use crag_knowledge::{ScoredChunk, SearchOptions};
use std::path::PathBuf;

/// Top-k similarity search over one knowledge base.
#[derive(Debug, Clone)]
pub struct KnowledgeRetriever {
    workspace: PathBuf,
    base_name: String,
    top_k: u32,
}

impl KnowledgeRetriever {
    pub fn new(workspace: impl Into<PathBuf>, base_name: impl Into<String>, top_k: u32) -> Self {
        Self {
            workspace: workspace.into(),
            base_name: base_name.into(),
            top_k,
        }
    }
}

/// Chunk text becomes the content; chunk metadata plus the score become
/// the provenance.
fn to_document(scored: ScoredChunk) -> Document {
    let mut metadata = match scored.chunk.metadata {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    metadata.insert("score".to_string(), serde_json::json!(scored.score));
    metadata
        .entry("chunk_id")
        .or_insert_with(|| serde_json::Value::String(scored.chunk.id.clone()));
    metadata
        .entry("position")
        .or_insert_with(|| serde_json::json!(scored.chunk.position));

    Document::new(scored.chunk.text).with_metadata(serde_json::Value::Object(metadata))
}

#[async_trait]
impl Retriever for KnowledgeRetriever {
    async fn retrieve(&self, question: &str) -> AppResult<Vec<Document>> {
        let results = crag_knowledge::search(
            &self.workspace,
            SearchOptions {
                base_name: self.base_name.clone(),
                query: question.to_string(),
                top_k: self.top_k,
            },
        )
        .await?;

        Ok(results.into_iter().map(to_document).collect())
    }
}
