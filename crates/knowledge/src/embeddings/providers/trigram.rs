//! Offline embeddings built from hashed character trigrams.

use crate::embeddings::EmbeddingProvider;
use crag_core::AppResult;
use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "does", "do",
];

/// Deterministic, content-dependent embeddings for local use.
///
/// Each non-stop word contributes to the dimensions selected by hashing its
/// character trigrams and the whole word. Vectors are unit length, except
/// for text with no indexable words which maps to the zero vector.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

impl TrigramProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        let mut frequencies: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        {
            *frequencies.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &frequencies {
            let weight = (*freq as f32).sqrt();
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let idx = bucket(window.iter().copied(), 37, self.dimensions);
                vector[idx] += weight;
            }
            vector[bucket(word.chars(), 31, self.dimensions)] += *freq as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn bucket(chars: impl Iterator<Item = char>, multiplier: u64, dimensions: usize) -> usize {
    let hash = chars.fold(0u64, |acc, c| {
        acc.wrapping_mul(multiplier).wrapping_add(c as u64)
    });
    (hash % dimensions as u64) as usize
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_unit_length_and_deterministic() {
        let provider = TrigramProvider::new(384);
        let a = provider.embed("Agents use memory and planning").await.unwrap();
        let b = provider.embed("Agents use memory and planning").await.unwrap();

        assert_eq!(a.len(), 384);
        assert!((norm(&a) - 1.0).abs() < 1e-3);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = TrigramProvider::new(64);
        let v = provider.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_related_text_scores_higher() {
        let provider = TrigramProvider::new(384);
        let query = provider.embed("agent memory").await.unwrap();
        let related = provider
            .embed("Short-term memory lets an agent keep context.")
            .await
            .unwrap();
        let unrelated = provider
            .embed("Bread dough needs yeast, flour, water and salt.")
            .await
            .unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = TrigramProvider::new(128);
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(batch[0], provider.embed("first text").await.unwrap());
        assert_eq!(batch[1], provider.embed("second text").await.unwrap());
    }

    #[tokio::test]
    async fn test_utf8_text() {
        let provider = TrigramProvider::new(384);
        let v = provider
            .embed("Gamedex é um aplicativo 🎮 brasileiro para gerenciar jogos!")
            .await
            .unwrap();
        assert!((norm(&v) - 1.0).abs() < 1e-3);
    }
}
