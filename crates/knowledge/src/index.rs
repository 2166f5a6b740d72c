//! SQLite-backed vector index for knowledge chunks.

use crate::embeddings::cosine_similarity;
use crate::types::{KnowledgeChunk, KnowledgeSource};
use chrono::{DateTime, Utc};
use crag_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;

/// Open (creating if needed) the SQLite index database.
pub fn init_index(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Knowledge(format!("Failed to create index directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            location TEXT NOT NULL UNIQUE,
            content_type TEXT NOT NULL,
            learned_at TEXT NOT NULL,
            size_bytes INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL,
            FOREIGN KEY (source_id) REFERENCES sources(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id);
        "#,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

    tracing::debug!("Initialized SQLite index at {:?}", db_path);
    Ok(conn)
}

/// Store a source and all of its chunks in one transaction.
///
/// A source previously learned from the same location is replaced together
/// with its chunks. Readers see either the old or the new state.
pub fn replace_source(
    conn: &mut Connection,
    source: &KnowledgeSource,
    chunks: &[KnowledgeChunk],
) -> AppResult<()> {
    let tx = begin(conn)?;
    insert_source(&tx, source, chunks)?;
    commit(tx)
}

/// Store a batch of prepared sources in one transaction, optionally
/// clearing the index first. Nothing is removed unless every insert succeeds.
pub fn store_sources(
    conn: &mut Connection,
    reset: bool,
    batch: &[(KnowledgeSource, Vec<KnowledgeChunk>)],
) -> AppResult<()> {
    let tx = begin(conn)?;
    if reset {
        clear(&tx)?;
    }
    for (source, chunks) in batch {
        insert_source(&tx, source, chunks)?;
    }
    commit(tx)?;

    tracing::debug!("Stored {} sources (reset: {})", batch.len(), reset);
    Ok(())
}

fn begin(conn: &mut Connection) -> AppResult<Transaction<'_>> {
    conn.transaction()
        .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))
}

fn commit(tx: Transaction<'_>) -> AppResult<()> {
    tx.commit()
        .map_err(|e| AppError::Knowledge(format!("Failed to commit index changes: {}", e)))
}

fn clear(tx: &Transaction<'_>) -> AppResult<()> {
    tx.execute_batch("DELETE FROM chunks; DELETE FROM sources;")
        .map_err(|e| AppError::Knowledge(format!("Failed to reset index: {}", e)))
}

fn insert_source(
    tx: &Transaction<'_>,
    source: &KnowledgeSource,
    chunks: &[KnowledgeChunk],
) -> AppResult<()> {
    tx.execute(
        "DELETE FROM sources WHERE location = ?1",
        params![source.location],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to remove previous source: {}", e)))?;

    tx.execute(
        "INSERT INTO sources (id, location, content_type, learned_at, size_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            source.id,
            source.location,
            source.content_type,
            source.learned_at.to_rfc3339(),
            source.size_bytes as i64,
        ],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to insert source: {}", e)))?;

    let mut stmt = tx
        .prepare_cached(
            "INSERT INTO chunks (id, source_id, position, text, embedding, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare insert: {}", e)))?;

    for chunk in chunks {
        let embedding = chunk
            .embedding
            .as_deref()
            .ok_or_else(|| AppError::Knowledge("Chunk missing embedding".to_string()))?;
        let metadata = serde_json::to_string(&chunk.metadata)?;

        stmt.execute(params![
            chunk.id,
            chunk.source_id,
            chunk.position as i64,
            chunk.text,
            embedding_to_bytes(embedding),
            metadata,
        ])
        .map_err(|e| AppError::Knowledge(format!("Failed to insert chunk: {}", e)))?;
    }

    tracing::debug!("Stored source {} with {} chunks", source.location, chunks.len());
    Ok(())
}

/// Return the `top_k` chunks most similar to the query embedding.
///
/// Ties are broken by source and position so results are reproducible.
pub fn query_chunks(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
) -> AppResult<Vec<(KnowledgeChunk, f32)>> {
    let mut stmt = conn
        .prepare("SELECT id, source_id, position, text, embedding, metadata FROM chunks")
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to query chunks: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        let (id, source_id, position, text, embedding, metadata) =
            row.map_err(|e| AppError::Knowledge(format!("Failed to read chunk: {}", e)))?;
        let embedding = bytes_to_embedding(&embedding)?;
        let score = cosine_similarity(query_embedding, &embedding);

        results.push((
            KnowledgeChunk {
                id,
                source_id,
                position: position as u32,
                text,
                embedding: Some(embedding),
                metadata: serde_json::from_str(&metadata)?,
            },
            score,
        ));
    }

    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.source_id.cmp(&b.0.source_id))
            .then_with(|| a.0.position.cmp(&b.0.position))
    });
    results.truncate(top_k);

    tracing::debug!(
        "Retrieved {} chunks (requested top-{})",
        results.len(),
        top_k
    );

    Ok(results)
}

/// Count sources and chunks, and find the most recent learn time.
pub fn get_stats(conn: &Connection) -> AppResult<(u32, u32, Option<DateTime<Utc>>)> {
    let count = |sql: &str| -> AppResult<u32> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|v| v as u32)
            .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))
    };

    let sources_count = count("SELECT COUNT(*) FROM sources")?;
    let chunks_count = count("SELECT COUNT(*) FROM chunks")?;

    let last: Option<String> = conn
        .query_row("SELECT MAX(learned_at) FROM sources", [], |row| row.get(0))
        .optional()
        .map_err(|e| AppError::Knowledge(format!("Failed to read learn time: {}", e)))?
        .flatten();

    let last_learn_at = last
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc));

    Ok((sources_count, chunks_count, last_learn_at))
}

/// Delete all sources and chunks.
pub fn reset_index(conn: &mut Connection) -> AppResult<()> {
    let tx = begin(conn)?;
    clear(&tx)?;
    commit(tx)?;

    tracing::info!("Reset knowledge base index");
    Ok(())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
