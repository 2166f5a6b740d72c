//! Knowledge command handler.
//!
//! Manages the local knowledge bases the retriever reads from.

use anyhow::Context;
use clap::{Args, Subcommand};
use crag_core::config::AppConfig;
use crag_knowledge::{LearnOptions, SearchOptions};
use std::path::PathBuf;

/// Knowledge base management
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Learn from local files, directories and web pages
    Learn(KnowledgeLearnCommand),
    /// Show the chunks most similar to a query
    Search(KnowledgeSearchCommand),
    /// Clean up knowledge base
    Clean(KnowledgeCleanCommand),
    /// Show knowledge base statistics
    Stats(KnowledgeStatsCommand),
}

/// Learn from sources
#[derive(Args, Debug)]
pub struct KnowledgeLearnCommand {
    /// Knowledge base name
    pub base: String,

    /// Files or directories to learn from
    #[arg(long, required_unless_present = "url")]
    pub path: Vec<PathBuf>,

    /// Web pages or PDFs to fetch and learn from
    #[arg(long)]
    pub url: Vec<String>,

    /// Only learn paths containing one of these substrings
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip paths containing any of these substrings
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Reset base before learning
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeLearnCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing knowledge learn command for base '{}'", self.base);

        let options = LearnOptions {
            base_name: self.base.clone(),
            paths: self.path.clone(),
            urls: self.url.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            reset: self.reset,
        };

        let stats = crag_knowledge::learn(&config.workspace, options).await?;

        if self.json {
            let output = serde_json::json!({
                "base": self.base,
                "sourcesCount": stats.sources_count,
                "chunksCount": stats.chunks_count,
                "skippedCount": stats.skipped_count,
                "bytesProcessed": stats.bytes_processed,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Learned {} sources ({} chunks, {} bytes) in {:.2}s",
                stats.sources_count, stats.chunks_count, stats.bytes_processed, stats.duration_secs
            );
            if stats.skipped_count > 0 {
                println!("Skipped {} unreadable sources", stats.skipped_count);
            }
        }

        Ok(())
    }
}

/// Query the knowledge base without running the pipeline
#[derive(Args, Debug)]
pub struct KnowledgeSearchCommand {
    /// Knowledge base name
    pub base: String,

    /// Query text
    pub query: String,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long, default_value = "4")]
    pub top_k: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeSearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing knowledge search command for base '{}'", self.base);

        let options = SearchOptions {
            base_name: self.base.clone(),
            query: self.query.clone(),
            top_k: self.top_k,
        };
        let results = crag_knowledge::search(&config.workspace, options)
            .await
            .with_context(|| format!("Search in knowledge base '{}' failed", self.base))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No matching chunks");
        }
        for (i, result) in results.iter().enumerate() {
            let source = result.chunk.metadata["source"].as_str().unwrap_or("?");
            println!("[{}] {:.3} {}", i + 1, result.score, source);
            println!("{}", result.chunk.text.trim());
            println!();
        }

        Ok(())
    }
}

/// Clean knowledge base
#[derive(Args, Debug)]
pub struct KnowledgeCleanCommand {
    /// Knowledge base name
    pub base: String,
}

impl KnowledgeCleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing knowledge clean command for base '{}'", self.base);

        crag_knowledge::clean(&config.workspace, &self.base)?;

        println!("Knowledge base '{}' cleaned", self.base);

        Ok(())
    }
}

/// Show knowledge base stats
#[derive(Args, Debug)]
pub struct KnowledgeStatsCommand {
    /// Knowledge base name
    pub base: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing knowledge stats command for base '{}'", self.base);

        let stats = crag_knowledge::stats(&config.workspace, &self.base)?;

        if self.json {
            let output = serde_json::json!({
                "base": stats.base_name,
                "sourcesCount": stats.sources_count,
                "chunksCount": stats.chunks_count,
                "dbSizeBytes": stats.db_size_bytes,
                "lastLearnAt": stats.last_learn_at,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Knowledge base: {}", stats.base_name);
            println!("  Sources: {}", stats.sources_count);
            println!("  Chunks: {}", stats.chunks_count);
            println!("  DB size: {} bytes", stats.db_size_bytes);
            if let Some(last_learn) = stats.last_learn_at {
                println!("  Last learn: {}", last_learn);
            }
        }

        Ok(())
    }
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        match &self.action {
            KnowledgeAction::Learn(cmd) => cmd.execute(config).await,
            KnowledgeAction::Search(cmd) => cmd.execute(config).await,
            KnowledgeAction::Clean(cmd) => cmd.execute(config).await,
            KnowledgeAction::Stats(cmd) => cmd.execute(config).await,
        }
    }
}
