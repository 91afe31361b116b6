//! Anthropic Claude provider implementation
//!
//! Anthropic uses a different message format than OpenAI (image source blocks
//! instead of data-URI image_url parts), so we implement LlmProvider directly
//! rather than using the OpenAI-compatible base.

use crate::error::{LlmError, Result};
use crate::llm::provider::{GenerationOptions, LlmProvider, ProviderConfig, ProviderType};
use crate::llm::providers::base::HttpProviderClient;
use crate::llm::{ContentPart, EmbeddingResponse, GenerationResponse, Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Anthropic content block (request side)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnthropicContent {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// Anthropic message format
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Vec<AnthropicContent>,
}

impl From<&Message> for AnthropicMessage {
    fn from(msg: &Message) -> Self {
        let content = msg
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => AnthropicContent::Text { text: text.clone() },
                ContentPart::Image { media_type, data } => AnthropicContent::Image {
                    source: AnthropicImageSource {
                        source_type: "base64".to_string(),
                        media_type: media_type.clone(),
                        data: data.clone(),
                    },
                },
            })
            .collect();

        Self {
            role: match msg.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
                Role::System => "user".to_string(), // System messages handled separately
            },
            content,
        }
    }
}

/// Anthropic API request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Anthropic API response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: HttpProviderClient,
    config: ProviderConfig,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn create(config: ProviderConfig) -> Arc<dyn LlmProvider> {
        let client = HttpProviderClient::new(config.timeout);
        Arc::new(Self { client, config })
    }

    /// Create from the ANTHROPIC_API_KEY environment variable
    pub fn from_env(text_model: String) -> std::result::Result<Arc<dyn LlmProvider>, String> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| "ANTHROPIC_API_KEY environment variable not set")?;

        let config = ProviderConfig {
            provider: ProviderType::Anthropic,
            name: "anthropic".to_string(),
            priority: 10,
            api_key: Some(api_key),
            base_url: Some("https://api.anthropic.com".to_string()),
            text_model,
            embedding_model: None,
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

    fn base_url(&self) -> String {
        self.config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string())
    }

    fn build_headers(&self) -> Vec<(&str, String)> {
        let mut headers = vec![
            ("Content-Type", "application/json".to_string()),
            ("anthropic-version", "2023-06-01".to_string()),
        ];

        if let Some(api_key) = &self.config.api_key {
            headers.push(("x-api-key", api_key.clone()));
        }

        headers
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports_vision(&self) -> bool {
        self.config.supports_vision
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        debug!(
            "Generating with Anthropic using {} messages",
            messages.len()
        );

        // Extract system message if present
        let system_message = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.text_content());

        // Convert non-system messages
        let anthropic_messages: Vec<AnthropicMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(AnthropicMessage::from)
            .collect();

        if anthropic_messages.is_empty() {
            return Err(LlmError::InvalidResponse("No messages to send".to_string()).into());
        }

        let request = AnthropicRequest {
            model: self.config.text_model.clone(),
            messages: anthropic_messages,
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            system: system_message,
            temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
        };

        let url = format!("{}/v1/messages", self.base_url().trim_end_matches('/'));
        let headers = self.build_headers();

        let started = Instant::now();
        let response: AnthropicResponse =
            self.client.post_json(&url, &request, &headers).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if response.content.is_empty() {
            return Err(LlmError::InvalidResponse("No content in response".to_string()).into());
        }

        let text = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let tokens_input = response.usage.input_tokens;
        let tokens_output = response.usage.output_tokens;

        info!(
            "Generated {} tokens with {} in {}ms",
            tokens_input + tokens_output,
            response.model,
            latency_ms
        );

        Ok(GenerationResponse {
            text,
            tokens_input,
            tokens_output,
            cost_usd: self.config.cost_for(tokens_input, tokens_output),
            latency_ms,
            model: response.model,
            finish_reason: response.stop_reason,
        })
    }

    async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
        // Anthropic doesn't provide embeddings directly
        Err(LlmError::EmbeddingFailed(
            "Anthropic does not provide native embeddings. Use an OpenAI-compatible provider."
                .to_string(),
        )
        .into())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        debug!("Listing models from Anthropic");

        // Anthropic has no public models endpoint; report the configured model
        Ok(vec![self.config.text_model.clone()])
    }
}
