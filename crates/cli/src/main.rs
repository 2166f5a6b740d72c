//! CRAG CLI
//!
//! Main entry point for the crag command-line tool: answer questions with a
//! corrective RAG pipeline and manage the knowledge bases it retrieves from.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, KnowledgeCommand, ResumeCommand};
use crag_core::{config::AppConfig, logging};
use std::path::PathBuf;

/// CRAG - corrective retrieval-augmented question answering
#[derive(Parser, Debug)]
#[command(name = "crag")]
#[command(about = "Corrective retrieval-augmented question answering", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CRAG_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// LLM provider (openai, ollama)
    #[arg(short, long, global = true, env = "CRAG_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "CRAG_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question through the pipeline
    Ask(AskCommand),

    /// Continue an interrupted run
    Resume(ResumeCommand),

    /// Knowledge base management
    Knowledge(KnowledgeCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;

    // Flags naming a different workspace or config file than the environment
    // did bring in that file before the remaining overrides apply
    let config_path = cli.config.clone().or_else(|| {
        cli.workspace
            .as_ref()
            .map(|ws| ws.join(".crag/config.yaml"))
    });
    if let Some(path) = config_path {
        let already_loaded = config.config_file.as_ref() == Some(&path)
            || config.workspace.join(".crag/config.yaml") == path;
        if path.exists() && !already_loaded {
            config = config.merge_yaml(&path)?;
        }
    }

    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if cli.log_json {
        config.log_json = true;
    }

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("CRAG CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_crag_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Resume(_) => "resume",
        Commands::Knowledge(_) => "knowledge",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Resume(cmd) => cmd.execute(&config).await,
        Commands::Knowledge(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
