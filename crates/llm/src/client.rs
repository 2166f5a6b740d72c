//! Provider-neutral chat completion types.
//!
//! Pipeline steps issue short, single-turn completions: a grading verdict, a
//! rewritten query or a final answer. Requests carry the rendered prompt and
//! optional system message; streaming is never needed.

use crag_core::AppResult;
use serde::{Deserialize, Serialize};

/// One single-turn completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature; pipeline steps pin it to 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Constrain the reply to a JSON object (used by the grader).
    #[serde(default)]
    pub json_output: bool,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system: None,
            temperature: None,
            max_tokens: None,
            json_output: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Text returned by a provider, with the model that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: LlmUsage,

    /// False when the provider stopped early (length limit, interruption).
    #[serde(default = "finished")]
    pub done: bool,
}

fn finished() -> bool {
    true
}

/// Token accounting as reported by the provider; zero when it reports none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A chat model behind some provider.
///
/// `complete` returns `AppError::Auth` when the provider rejects the
/// credentials, and `AppError::Llm` for every other failure.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Short provider id, such as `ollama` or `openai`.
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}
