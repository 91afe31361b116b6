//! OpenAI provider implementation

use crate::llm::provider::{LlmProvider, ProviderConfig, ProviderType};
use crate::llm::providers::base::OpenAICompatible;
use crate::llm::providers::openai_compatible::OpenAICompatibleProvider;
use std::sync::Arc;

/// Adapter for the OpenAI API
pub struct OpenAIAdapter {
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatible for OpenAIAdapter {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

/// OpenAI provider
pub struct OpenAIProvider;

impl OpenAIProvider {
    /// Create a new OpenAI provider
    pub fn create(config: ProviderConfig) -> Arc<dyn LlmProvider> {
        let adapter = OpenAIAdapter {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: config.api_key.clone(),
        };

        Arc::new(OpenAICompatibleProvider::new(adapter, config))
    }

    /// Create from the OPENAI_API_KEY environment variable
    pub fn from_env(
        text_model: String,
        embedding_model: Option<String>,
    ) -> std::result::Result<Arc<dyn LlmProvider>, String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| "OPENAI_API_KEY environment variable not set")?;

        let config = ProviderConfig {
            provider: ProviderType::OpenAI,
            name: "openai".to_string(),
            priority: 10,
            api_key: Some(api_key),
            base_url: Some("https://api.openai.com/v1".to_string()),
            text_model,
            embedding_model,
            supports_vision: true,
            max_tokens: 4096,
            temperature: 0.1,
            timeout: 180,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            options: serde_json::Value::Null,
        };

        Ok(Self::create(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let config = ProviderConfig {
            provider: ProviderType::OpenAI,
            name: "openai".to_string(),
            priority: 1,
            api_key: Some("test-key".to_string()),
            base_url: None,
            text_model: "gpt-4o".to_string(),
            embedding_model: Some("text-embedding-3-small".to_string()),
            supports_vision: true,
            max_tokens: 4096,
            temperature: 0.1,
            timeout: 60,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            options: serde_json::Value::Null,
        };

        let provider = OpenAIProvider::create(config);
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.provider_type(), ProviderType::OpenAI);
    }
}
