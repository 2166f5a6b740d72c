//! Data carried between learning, the index and search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-base settings, stored as `config.yaml` next to the index. Changing
/// the provider or dimension of a learned base needs a reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    pub name: String,

    /// "trigram" (offline) or "ollama"
    pub provider: String,
    pub model: String,

    /// Ollama only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// In characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: u32,
}

fn default_chunk_size() -> u32 {
    250
}

fn default_chunk_overlap() -> u32 {
    0
}

fn default_embedding_dim() -> u32 {
    384
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            endpoint: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

/// One learned file or page. Learning the same location again replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,

    /// File path or URL the text came from
    pub location: String,

    /// "markdown", "html", "pdf" or "text"
    pub content_type: String,

    pub learned_at: DateTime<Utc>,

    /// Size of the extracted text
    pub size_bytes: u64,
}

/// A slice of a source with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub source_id: String,

    /// Order within the source, from 0
    pub position: u32,

    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// `source`, `chunk_id`, `position` and the `start`/`end` byte range
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// What to learn and how.
///
/// Paths and URLs are all resolved before the index is touched; with `reset`
/// the old contents are replaced in the same transaction as the new ones.
#[derive(Debug, Clone, Default)]
pub struct LearnOptions {
    pub base_name: String,

    /// Files or directories (walked recursively)
    pub paths: Vec<PathBuf>,

    /// Pages fetched over HTTP
    pub urls: Vec<String>,

    /// Substrings a path must contain to be included (empty = all)
    pub include: Vec<String>,

    /// Substrings that exclude a path
    pub exclude: Vec<String>,

    pub reset: bool,
}

/// Outcome of one learn call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnStats {
    pub sources_count: u32,
    pub chunks_count: u32,

    /// Sources that could not be read, parsed or embedded
    pub skipped_count: u32,

    pub bytes_processed: u64,
    pub duration_secs: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub base_name: String,
    pub query: String,

    /// Maximum number of chunks returned
    pub top_k: u32,
}

/// A chunk with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStats {
    pub base_name: String,
    pub sources_count: u32,
    pub chunks_count: u32,

    /// Size of the SQLite file
    pub db_size_bytes: u64,

    /// Most recent `learned_at` across sources
    pub last_learn_at: Option<DateTime<Utc>>,
}

/// A chunk as cut by the chunker, before it is embedded.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub source_id: String,
    pub position: u32,
    pub text: String,
    pub metadata: serde_json::Value,
}
