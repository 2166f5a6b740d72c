//! Concrete components: LLM prompts, the local knowledge base and Tavily.

pub mod knowledge;
pub mod llm;
pub mod tavily;

pub use knowledge::KnowledgeRetriever;
pub use llm::{LlmGenerator, LlmGrader, LlmRewriter};
pub use tavily::TavilySearch;
