//! Batch embedding service
//!
//! Thin contract over the embedding capability of an LLM provider. Batches
//! carry their cost and model so the storage layer can account per document.

use crate::error::{LlmError, Result};
use crate::llm::provider::LlmProvider;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-batch embedding timeout
const BATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of embedding a batch of texts
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub success: bool,
    pub embeddings: Vec<Vec<f32>>,
    pub cost: f64,
    pub model_used: String,
    pub error: Option<String>,
}

/// Batch-oriented embedding service
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch>;
}

/// Embedding service backed by an LLM provider's embedding endpoint
pub struct LlmEmbeddingService {
    provider: Arc<dyn LlmProvider>,
    /// Cost per 1000 tokens of embedded text
    cost_per_1k_tokens: f64,
}

impl LlmEmbeddingService {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            cost_per_1k_tokens: 0.0,
        }
    }

    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }
}

#[async_trait]
impl EmbeddingService for LlmEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch {
                success: true,
                embeddings: Vec::new(),
                cost: 0.0,
                model_used: String::new(),
                error: None,
            });
        }

        debug!("Embedding batch of {} texts", texts.len());

        let responses = tokio::time::timeout(BATCH_TIMEOUT, self.provider.embed_batch(texts))
            .await
            .map_err(|_| LlmError::Timeout)??;

        let model_used = responses
            .first()
            .map(|r| r.model.clone())
            .unwrap_or_default();
        let token_estimate: i64 = texts
            .iter()
            .map(|t| crate::rag::types::estimate_tokens(t))
            .sum();
        let cost = token_estimate as f64 / 1000.0 * self.cost_per_1k_tokens;

        info!(
            "Embedded {} texts with {} (~{} tokens)",
            texts.len(),
            model_used,
            token_estimate
        );

        Ok(EmbeddingBatch {
            success: true,
            embeddings: responses.into_iter().map(|r| r.embedding).collect(),
            cost,
            model_used,
            error: None,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeEmbeddingService;
    use super::*;

    #[tokio::test]
    async fn test_fake_service_is_deterministic() {
        let service = FakeEmbeddingService { dimensions: 8 };
        let texts = vec!["alpha".to_string(), "beta".to_string()];

        let first = service.embed_batch(&texts).await.unwrap();
        let second = service.embed_batch(&texts).await.unwrap();

        assert_eq!(first.embeddings, second.embeddings);
        assert_eq!(first.embeddings.len(), 2);
        assert_eq!(first.embeddings[0].len(), 8);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let service = FakeEmbeddingService { dimensions: 8 };
        let batch = service.embed_batch(&[]).await.unwrap();
        assert!(batch.success);
        assert!(batch.embeddings.is_empty());
    }
}
