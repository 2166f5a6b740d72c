//! Corrective RAG pipeline engine.
//!
//! A question flows through a fixed topology: retrieve candidate documents,
//! grade each for relevance, and either answer directly or first rewrite the
//! question and add a web search result. See [`step`] for the state machine
//! and [`orchestrator::Pipeline`] for the driver.
//!
//! # Example
//! ```no_run
//! use crag_core::config::AppConfig;
//! use crag_engine::build_pipeline;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let pipeline = build_pipeline(&config)?;
//! let state = pipeline.run("What is LangGraph?").await?;
//! println!("{}", state.generation.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod checkpoint;
pub mod components;
pub mod error;
pub mod events;
pub mod factory;
pub mod orchestrator;
pub mod settings;
pub mod state;
pub mod step;

pub use checkpoint::{
    CheckpointError, Checkpointer, FileCheckpointer, MemoryCheckpointer, RunCheckpoint,
};
pub use components::{Generator, Grade, Grader, Retriever, Rewriter, SearchHit, WebSearch};
pub use error::{RunError, RunErrorKind};
pub use events::{ChannelObserver, RunObserver, StepEvent};
pub use factory::build_pipeline;
pub use orchestrator::{Components, Pipeline, RunOptions, WEB_SEARCH_SOURCE};
pub use settings::PipelineSettings;
pub use state::{Document, RunState, WebSearchDecision};
pub use step::{decide_to_generate, filter_relevant, Route, Step};
