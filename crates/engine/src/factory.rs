//! Build a pipeline from application configuration.
//!
//! All configuration and credential problems are reported here, before a
//! run starts.

use crate::adapters::{KnowledgeRetriever, LlmGenerator, LlmGrader, LlmRewriter, TavilySearch};
use crate::checkpoint::FileCheckpointer;
use crate::error::RunError;
use crate::orchestrator::{Components, Pipeline};
use crate::settings::PipelineSettings;
use crag_core::config::AppConfig;
use std::sync::Arc;

/// Create the production pipeline: LLM-backed grader, rewriter and
/// generator, the configured knowledge base, Tavily search, and a file
/// checkpointer under the configured checkpoint directory.
pub fn build_pipeline(config: &AppConfig) -> Result<Pipeline, RunError> {
    config.validate()?;

    let provider = config.provider.to_lowercase();
    let api_key = config.resolve_api_key(&provider);
    let endpoint = config.provider_endpoint();
    let client = crag_llm::create_client(&provider, endpoint.as_deref(), api_key.as_deref())?;

    let search_key = config.resolve_search_key().ok_or_else(|| {
        RunError::configuration(format!(
            "Search API key not found in environment variable: {}",
            config.search.api_key_env
        ))
    })?;
    let mut search = TavilySearch::new(search_key)?
        .with_max_results(config.search.max_results)
        .with_max_retries(config.search.max_retries);
    if let Some(ref endpoint) = config.search.endpoint {
        search = search.with_endpoint(endpoint.clone());
    }

    let workspace = config.workspace.as_path();
    let components = Components {
        retriever: Arc::new(KnowledgeRetriever::new(
            workspace,
            config.pipeline.knowledge_base.clone(),
            config.pipeline.top_k,
        )),
        grader: Arc::new(LlmGrader::new(client.clone(), &config.model, workspace)?),
        rewriter: Arc::new(LlmRewriter::new(client.clone(), &config.model, workspace)?),
        web_search: Arc::new(search),
        generator: Arc::new(LlmGenerator::new(client, &config.model, workspace)?),
    };

    tracing::debug!(
        "Built pipeline: provider={}, model={}, knowledge base={}",
        provider,
        config.model,
        config.pipeline.knowledge_base
    );

    let settings = PipelineSettings::from(&config.pipeline);
    Ok(Pipeline::new(components, settings)
        .with_checkpointer(Arc::new(FileCheckpointer::new(config.checkpoint_dir()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunErrorKind;
    use tempfile::TempDir;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.workspace = dir.to_path_buf();
        config
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(temp.path());
        config.provider = "nope".to_string();

        let err = build_pipeline(&config).err().unwrap();
        assert_eq!(err.kind, RunErrorKind::Configuration);
        assert!(err.step.is_none());
    }

    #[test]
    fn test_missing_search_key_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(temp.path());
        config.search.api_key_env = "CRAG_TEST_UNSET_SEARCH_KEY".to_string();

        let err = build_pipeline(&config).err().unwrap();
        assert_eq!(err.kind, RunErrorKind::Configuration);
        assert!(err.message.contains("CRAG_TEST_UNSET_SEARCH_KEY"));
    }
}
