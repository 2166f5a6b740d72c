//! Embedding providers for knowledge bases.

pub mod providers;

use crate::types::KnowledgeBaseConfig;
use crag_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "trigram", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}

/// Create the embedding provider a knowledge base is configured with.
pub fn create_provider(config: &KnowledgeBaseConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let dimensions = config.embedding_dim as usize;
    if dimensions == 0 {
        return Err(AppError::Knowledge(
            "Embedding dimension must be greater than zero".to_string(),
        ));
    }

    match config.provider.as_str() {
        "trigram" => Ok(Arc::new(providers::trigram::TrigramProvider::new(
            dimensions,
        ))),
        "ollama" => {
            let mut provider =
                providers::ollama::OllamaProvider::new(config.model.clone(), dimensions)?;
            if let Some(ref endpoint) = config.endpoint {
                provider = provider.with_base_url(endpoint);
            }
            Ok(Arc::new(provider))
        }
        other => Err(AppError::Knowledge(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            other
        ))),
    }
}

/// Cosine similarity of two vectors. Zero when either vector is zero or
/// the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_trigram_provider() {
        let config = KnowledgeBaseConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "trigram");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn test_create_ollama_provider_is_lazy() {
        let config = KnowledgeBaseConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            endpoint: Some("http://127.0.0.1:1".to_string()),
            embedding_dim: 768,
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = KnowledgeBaseConfig {
            provider: "gguf".to_string(),
            ..Default::default()
        };
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
