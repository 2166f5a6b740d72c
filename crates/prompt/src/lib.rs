//! Prompt system for CRAG.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions, built in and overridable per workspace
//! - Handlebars template rendering for system and user messages

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{
    list_prompts, load_prompt, GENERATE_PROMPT_ID, GRADE_PROMPT_ID, REWRITE_PROMPT_ID,
};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOrigin, PromptOutputSpec};
