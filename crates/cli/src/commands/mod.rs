//! Command handlers for the CRAG CLI.

pub mod ask;
pub mod knowledge;
pub mod resume;
mod render;

pub use ask::AskCommand;
pub use knowledge::KnowledgeCommand;
pub use resume::ResumeCommand;
