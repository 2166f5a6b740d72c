//! Grader, rewriter and generator backed by an LLM and prompt definitions.

use crate::components::{Generator, Grade, Grader, Rewriter};
use crate::state::Document;
use async_trait::async_trait;
use crag_core::{AppError, AppResult};
use crag_llm::{LlmClient, LlmRequest};
use crag_prompt::{
    build_prompt, load_prompt, PromptDefinition, GENERATE_PROMPT_ID, GRADE_PROMPT_ID,
    REWRITE_PROMPT_ID,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Model, prompt and sampling shared by the three LLM components.
#[derive(Clone)]
struct PromptedModel {
    client: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    temperature: f32,
}

impl PromptedModel {
    async fn complete(&self, variables: HashMap<String, String>) -> AppResult<String> {
        let built = build_prompt(&self.prompt, variables)?;

        let mut request =
            LlmRequest::new(built.user, self.model.clone()).with_temperature(self.temperature);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if built.json_output {
            request = request.with_json_output();
        }

        tracing::trace!(
            "Calling {} with prompt {}",
            self.client.provider_name(),
            self.prompt.id
        );
        let response = self.client.complete(&request).await?;
        Ok(response.content)
    }
}

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Binary relevance grader.
#[derive(Clone)]
pub struct LlmGrader {
    inner: PromptedModel,
}

impl LlmGrader {
    /// Load the `crag.grade` prompt (workspace override or built-in).
    pub fn new(client: Arc<dyn LlmClient>, model: &str, workspace: &Path) -> AppResult<Self> {
        Ok(Self::with_prompt(
            client,
            model,
            load_prompt(workspace, GRADE_PROMPT_ID)?,
        ))
    }

    pub fn with_prompt(client: Arc<dyn LlmClient>, model: &str, prompt: PromptDefinition) -> Self {
        Self {
            inner: PromptedModel {
                client,
                model: model.to_string(),
                prompt,
                temperature: 0.0,
            },
        }
    }
}

#[derive(Deserialize)]
struct GradeOutput {
    binary_score: String,
}

/// Read a `yes`/`no` verdict from model output.
///
/// Accepts a JSON object with `binary_score` (also inside surrounding text or
/// a code fence) or a bare yes/no answer. Anything else is malformed.
pub fn parse_grade(output: &str) -> AppResult<Grade> {
    let trimmed = output.trim();

    let score = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<GradeOutput>(&trimmed[start..=end])
                .map(|g| g.binary_score)
                .ok()
        }
        _ => None,
    }
    .unwrap_or_else(|| trimmed.to_string());

    let word = score
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();

    match word.as_str() {
        "yes" => Ok(Grade { relevant: true }),
        "no" => Ok(Grade { relevant: false }),
        _ => Err(AppError::Llm(format!(
            "grader returned malformed output: {:?}",
            output
        ))),
    }
}

#[async_trait]
impl Grader for LlmGrader {
    async fn grade(&self, question: &str, document: &str) -> AppResult<Grade> {
        let output = self
            .inner
            .complete(vars(&[("question", question), ("document", document)]))
            .await?;
        parse_grade(&output)
    }
}

/// Rewrites questions for web search.
#[derive(Clone)]
pub struct LlmRewriter {
    inner: PromptedModel,
}

impl LlmRewriter {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, workspace: &Path) -> AppResult<Self> {
        Ok(Self::with_prompt(
            client,
            model,
            load_prompt(workspace, REWRITE_PROMPT_ID)?,
        ))
    }

    pub fn with_prompt(client: Arc<dyn LlmClient>, model: &str, prompt: PromptDefinition) -> Self {
        Self {
            inner: PromptedModel {
                client,
                model: model.to_string(),
                prompt,
                temperature: 0.0,
            },
        }
    }
}

/// Strip whitespace and wrapping quotes from a rewritten question.
fn clean_rewrite(output: &str) -> String {
    output
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

#[async_trait]
impl Rewriter for LlmRewriter {
    async fn rewrite(&self, question: &str) -> AppResult<String> {
        let output = self.inner.complete(vars(&[("question", question)])).await?;
        let rewritten = clean_rewrite(&output);
        if rewritten.is_empty() {
            return Err(AppError::Llm(
                "rewriter returned an empty question".to_string(),
            ));
        }
        Ok(rewritten)
    }
}

/// Answers from the supplied documents.
#[derive(Clone)]
pub struct LlmGenerator {
    inner: PromptedModel,
}

impl LlmGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, workspace: &Path) -> AppResult<Self> {
        Ok(Self::with_prompt(
            client,
            model,
            load_prompt(workspace, GENERATE_PROMPT_ID)?,
        ))
    }

    pub fn with_prompt(client: Arc<dyn LlmClient>, model: &str, prompt: PromptDefinition) -> Self {
        Self {
            inner: PromptedModel {
                client,
                model: model.to_string(),
                prompt,
                temperature: 0.0,
            },
        }
    }
}

/// Documents separated by blank lines.
pub fn format_context(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, question: &str, documents: &[Document]) -> AppResult<String> {
        let context = format_context(documents);
        let output = self
            .inner
            .complete(vars(&[("question", question), ("context", &context)]))
            .await?;
        Ok(output.trim().to_string())
    }
}
