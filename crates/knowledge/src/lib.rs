//! Knowledge base management.
//!
//! Local documents and fetched pages are parsed, chunked, embedded and
//! stored in a per-base SQLite index under `.crag/knowledge/<base>/`.
//! Retrieval ranks chunks by cosine similarity to the embedded query.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod fetch;
pub mod index;
pub mod parser;
pub mod types;

pub use embeddings::{create_provider, EmbeddingProvider};
pub use types::{
    BaseStats, KnowledgeBaseConfig, KnowledgeChunk, KnowledgeSource, LearnOptions, LearnStats,
    ScoredChunk, SearchOptions,
};

use chrono::Utc;
use crag_core::{AppError, AppResult};
use parser::ContentType;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Learn from files, directories and URLs and populate the knowledge base.
///
/// Every source is parsed and embedded before the index is opened, and the
/// results are written in one transaction (after clearing the base when
/// `reset` is set). A missing path fails the call with the base untouched.
/// A source that fails to fetch, parse or embed is skipped and counted in
/// [`LearnStats::skipped_count`].
pub async fn learn(workspace: &Path, options: LearnOptions) -> AppResult<LearnStats> {
    let start = Instant::now();

    tracing::info!("Starting learn operation for base '{}'", options.base_name);

    let config = config::load_config(workspace, &options.base_name)?;
    let files = collect_files(&options)?;
    let provider = create_provider(&config)?;

    let mut stats = LearnStats::default();
    let mut prepared = Vec::new();

    for path in &files {
        let location = path.to_string_lossy().to_string();
        let parsed = parser::parse_file(path);
        match prepare_source(provider.as_ref(), &config, location, parsed).await {
            Ok(source) => prepared.push(source),
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                stats.skipped_count += 1;
            }
        }
    }

    if !options.urls.is_empty() {
        let client = fetch::client()?;
        for url in &options.urls {
            let fetched = fetch::fetch_url(&client, url).await;
            match prepare_source(provider.as_ref(), &config, url.clone(), fetched).await {
                Ok(source) => prepared.push(source),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", url, e);
                    stats.skipped_count += 1;
                }
            }
        }
    }

    for (source, chunks) in &prepared {
        stats.sources_count += 1;
        stats.chunks_count += chunks.len() as u32;
        stats.bytes_processed += source.size_bytes;
    }

    let index_path = config::get_index_path(workspace, &options.base_name);
    let reset = options.reset;
    tokio::task::spawn_blocking(move || -> AppResult<()> {
        let mut conn = index::init_index(&index_path)?;
        if reset {
            tracing::info!("Replacing previous contents of the knowledge base");
        }
        index::store_sources(&mut conn, reset, &prepared)
    })
    .await
    .map_err(|e| AppError::Knowledge(format!("Index write task failed: {}", e)))??;

    config::save_config(workspace, &config)?;

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Learn operation completed: {} sources, {} chunks, {} skipped in {:.2}s",
        stats.sources_count,
        stats.chunks_count,
        stats.skipped_count,
        stats.duration_secs
    );

    Ok(stats)
}

/// Expand the requested paths into files, in a stable order.
fn collect_files(options: &LearnOptions) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in &options.paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && should_include(entry.path(), options) {
                    files.push(entry.into_path());
                }
            }
        } else {
            return Err(AppError::Knowledge(format!("Path not found: {:?}", path)));
        }
    }
    Ok(files)
}

/// Chunk and embed one parsed source.
async fn prepare_source(
    provider: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
    location: String,
    parsed: AppResult<(String, ContentType)>,
) -> AppResult<(KnowledgeSource, Vec<KnowledgeChunk>)> {
    let (text, content_type) = parsed?;

    let source = KnowledgeSource {
        id: uuid::Uuid::new_v4().to_string(),
        location,
        content_type: content_type.as_str().to_string(),
        learned_at: Utc::now(),
        size_bytes: text.len() as u64,
    };

    let candidates = chunker::chunk_text(
        &source.id,
        &text,
        config.chunk_size as usize,
        config.chunk_overlap as usize,
    );

    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let embeddings = provider.embed_batch(&texts).await?;
    if embeddings.len() != candidates.len() {
        return Err(AppError::Knowledge(format!(
            "Embedding provider returned {} vectors for {} chunks",
            embeddings.len(),
            candidates.len()
        )));
    }

    let chunks = candidates
        .into_iter()
        .zip(embeddings)
        .map(|(candidate, embedding)| {
            let id = uuid::Uuid::new_v4().to_string();
            let mut metadata = candidate.metadata;
            metadata["source"] = serde_json::Value::String(source.location.clone());
            metadata["chunk_id"] = serde_json::Value::String(id.clone());
            metadata["position"] = serde_json::Value::from(candidate.position);

            KnowledgeChunk {
                id,
                source_id: candidate.source_id,
                position: candidate.position,
                text: candidate.text,
                embedding: Some(embedding),
                metadata,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!("Prepared {}: {} chunks", source.location, chunks.len());
    Ok((source, chunks))
}

/// Check if a file should be included based on patterns.
fn should_include(path: &Path, options: &LearnOptions) -> bool {
    let path_str = path.to_string_lossy();

    if options.exclude.iter().any(|p| path_str.contains(p.as_str())) {
        return false;
    }

    options.include.is_empty() || options.include.iter().any(|p| path_str.contains(p.as_str()))
}

/// Return the chunks most similar to the query, best first.
pub async fn search(workspace: &Path, options: SearchOptions) -> AppResult<Vec<ScoredChunk>> {
    tracing::debug!(
        "Searching knowledge base '{}' (top-{})",
        options.base_name,
        options.top_k
    );

    let config = config::load_config(workspace, &options.base_name)?;

    let index_path = config::get_index_path(workspace, &options.base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' has no index. Run 'crag knowledge learn' first.",
            options.base_name
        )));
    }

    let provider = create_provider(&config)?;
    let query_embedding = provider.embed(&options.query).await?;
    let top_k = options.top_k as usize;

    let results = tokio::task::spawn_blocking(move || -> AppResult<Vec<ScoredChunk>> {
        let conn = index::init_index(&index_path)?;
        let ranked = index::query_chunks(&conn, &query_embedding, top_k)?;
        Ok(ranked
            .into_iter()
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect())
    })
    .await
    .map_err(|e| AppError::Knowledge(format!("Index query task failed: {}", e)))??;

    if let Some(best) = results.first() {
        tracing::debug!(
            "Retrieved {} chunks (top score: {:.3})",
            results.len(),
            best.score
        );
    }

    Ok(results)
}

/// Clean (reset) a knowledge base.
pub fn clean(workspace: &Path, base_name: &str) -> AppResult<()> {
    config::validate_base_name(base_name)?;
    tracing::info!("Cleaning knowledge base '{}'", base_name);

    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    let mut conn = index::init_index(&index_path)?;
    index::reset_index(&mut conn)?;

    tracing::info!("Knowledge base '{}' cleaned", base_name);
    Ok(())
}

/// Get statistics for a knowledge base.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    config::validate_base_name(base_name)?;
    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    let conn = index::init_index(&index_path)?;
    let (sources_count, chunks_count, last_learn_at) = index::get_stats(&conn)?;

    let db_size_bytes = std::fs::metadata(&index_path)
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(BaseStats {
        base_name: base_name.to_string(),
        sources_count,
        chunks_count,
        db_size_bytes,
        last_learn_at,
    })
}
