//! LLM provider factory.
//!
//! This module creates LLM clients based on application configuration. It
//! handles provider resolution and credential checks, so a missing key is
//! reported as a configuration error before any model call is attempted.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use crag_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("openai", "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required
/// credential is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        ProviderType::OpenAI => {
            let key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| AppError::Config("OpenAI provider requires API key".to_string()))?;
            let client = match endpoint {
                Some(url) => OpenAiClient::with_base_url(url, key),
                None => OpenAiClient::new(key),
            };
            Ok(Arc::new(client))
        }
    }
}
