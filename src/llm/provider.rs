//! LLM provider trait and common types
//!
//! This module defines the common interface that all LLM providers must implement.

use crate::error::Result;
use crate::llm::{EmbeddingResponse, GenerationResponse, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAI,
    /// Any endpoint speaking the OpenAI chat-completions dialect
    OpenAICompatible,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::OpenAICompatible => write!(f, "openai-compatible"),
        }
    }
}

/// Configuration for a specific LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type
    pub provider: ProviderType,

    /// Provider name/identifier
    pub name: String,

    /// Priority for selection (lower is higher priority)
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// API key (usually resolved from an environment variable)
    pub api_key: Option<String>,

    /// Base URL for API calls
    pub base_url: Option<String>,

    /// Model name for text generation
    pub text_model: String,

    /// Model name for embeddings
    pub embedding_model: Option<String>,

    /// Whether the text model accepts image input
    #[serde(default)]
    pub supports_vision: bool,

    /// Maximum tokens for generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Input cost per 1000 tokens in USD
    #[serde(default)]
    pub input_cost_per_1k: f64,

    /// Output cost per 1000 tokens in USD
    #[serde(default)]
    pub output_cost_per_1k: f64,

    /// Provider-specific options
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_priority() -> u8 {
    10
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    180
}

impl ProviderConfig {
    /// Estimate request cost from token usage
    pub fn cost_for(&self, tokens_input: u32, tokens_output: u32) -> f64 {
        (tokens_input as f64 / 1000.0) * self.input_cost_per_1k
            + (tokens_output as f64 / 1000.0) * self.output_cost_per_1k
    }
}

/// Per-call overrides for generation
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> ProviderType;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Whether this provider can process image parts
    fn supports_vision(&self) -> bool;

    /// Generate text from a conversation
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResponse>;

    /// Generate embeddings for text
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse>;

    /// Generate embeddings for a batch of texts
    ///
    /// Default implementation embeds sequentially; providers with a native
    /// batch endpoint should override.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResponse>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// List available models
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Check if a specific model is available
    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == model))
    }

    /// Test if the provider is accessible (health check)
    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    /// Get provider statistics (tokens used, cost, etc.)
    fn get_stats(&self) -> ProviderStats {
        ProviderStats::default()
    }
}

/// Provider usage statistics
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens_input: u64,
    pub total_tokens_output: u64,
    pub estimated_cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_display() {
        assert_eq!(ProviderType::Anthropic.to_string(), "anthropic");
        assert_eq!(ProviderType::OpenAI.to_string(), "openai");
    }

    #[test]
    fn test_cost_estimation() {
        let config = ProviderConfig {
            provider: ProviderType::Anthropic,
            name: "test".to_string(),
            priority: 1,
            api_key: None,
            base_url: None,
            text_model: "model".to_string(),
            embedding_model: None,
            supports_vision: true,
            max_tokens: 4096,
            temperature: 0.1,
            timeout: 60,
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
            options: serde_json::Value::Null,
        };

        let cost = config.cost_for(2000, 1000);
        assert!((cost - (0.006 + 0.015)).abs() < 1e-9);
    }
}
