//! OpenAI-compatible API implementation
//!
//! Provides a shared implementation for providers that use OpenAI-compatible
//! chat-completions APIs. Image parts are sent as `image_url` data URIs, which
//! is also the envelope local vision models accept.

use crate::error::{LlmError, Result};
use crate::llm::provider::{GenerationOptions, LlmProvider, ProviderConfig, ProviderType};
use crate::llm::providers::base::{HttpProviderClient, OpenAICompatible};
use crate::llm::{ContentPart, EmbeddingResponse, GenerationResponse, Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

/// OpenAI message content part
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// OpenAI message format; content is a plain string for text-only messages
/// and a part array once images are involved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: OpenAIContent,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system".to_string(),
            Role::User => "user".to_string(),
            Role::Assistant => "assistant".to_string(),
        };

        let content = if msg.has_image() {
            OpenAIContent::Parts(
                msg.content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => {
                            OpenAIContentPart::Text { text: text.clone() }
                        }
                        ContentPart::Image { media_type, data } => OpenAIContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:{};base64,{}", media_type, data),
                            },
                        },
                    })
                    .collect(),
            )
        } else {
            OpenAIContent::Text(msg.text_content())
        };

        Self { role, content }
    }
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UsageInfo {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

/// OpenAI embedding request (batch-oriented)
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

/// OpenAI embedding response
#[derive(Debug, Deserialize)]
pub struct EmbeddingResponseData {
    pub data: Vec<EmbeddingData>,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    pub index: u32,
}

/// OpenAI models list response
#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
pub struct ModelData {
    pub id: String,
}

/// Generic OpenAI-compatible provider
pub struct OpenAICompatibleProvider<T: OpenAICompatible + Send + Sync> {
    adapter: T,
    client: HttpProviderClient,
    config: ProviderConfig,
}

impl<T: OpenAICompatible + Send + Sync> OpenAICompatibleProvider<T> {
    /// Create a new OpenAI-compatible provider
    pub fn new(adapter: T, config: ProviderConfig) -> Self {
        let client = HttpProviderClient::new(config.timeout);

        Self {
            adapter,
            client,
            config,
        }
    }

    async fn embed_inputs(&self, inputs: Vec<String>) -> Result<Vec<EmbeddingResponse>> {
        let embedding_model = self.config.embedding_model.as_ref().ok_or_else(|| {
            LlmError::EmbeddingFailed("No embedding model configured".to_string())
        })?;

        let request = EmbeddingRequest {
            model: embedding_model.clone(),
            input: inputs,
        };

        let url = self.adapter.build_url("embeddings");
        let headers = self.adapter.request_headers();

        let mut response: EmbeddingResponseData =
            self.client.post_json(&url, &request, &headers).await?;

        if response.data.is_empty() {
            return Err(LlmError::EmbeddingFailed("No embeddings in response".to_string()).into());
        }

        response.data.sort_by_key(|d| d.index);

        let model = response.model;
        Ok(response
            .data
            .into_iter()
            .map(|d| EmbeddingResponse {
                embedding: d.embedding,
                model: model.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl<T: OpenAICompatible + Send + Sync> LlmProvider for OpenAICompatibleProvider<T> {
    fn provider_type(&self) -> ProviderType {
        self.config.provider
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
            "Generating with {} using {} messages",
            self.name(),
            messages.len()
        );

        let request = ChatCompletionRequest {
            model: self.config.text_model.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            max_tokens: Some(options.max_tokens.unwrap_or(self.config.max_tokens)),
            temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
            stream: false,
        };

        let url = self.adapter.build_url("chat/completions");
        let headers = self.adapter.request_headers();

        let started = Instant::now();
        let response: ChatCompletionResponse =
            self.client.post_json(&url, &request, &headers).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if response.choices.is_empty() {
            return Err(LlmError::InvalidResponse("No choices in response".to_string()).into());
        }

        let choice = &response.choices[0];
        let usage = response.usage.unwrap_or_default();

        info!(
            "Generated {} tokens with {} in {}ms",
            usage.prompt_tokens + usage.completion_tokens,
            response.model,
            latency_ms
        );

        Ok(GenerationResponse {
            text: choice.message.content.clone().unwrap_or_default(),
            tokens_input: usage.prompt_tokens,
            tokens_output: usage.completion_tokens,
            cost_usd: self
                .config
                .cost_for(usage.prompt_tokens, usage.completion_tokens),
            latency_ms,
            model: response.model,
            finish_reason: choice.finish_reason.clone(),
        })
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        let mut results = self.embed_inputs(vec![text.to_string()]).await?;
        Ok(results.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResponse>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_inputs(texts.to_vec()).await
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        debug!("Listing models from {}", self.name());

        let url = self.adapter.build_url("models");
        let headers = self.adapter.request_headers();

        let response: ModelsResponse = self.client.get_json(&url, &headers).await?;
        let models: Vec<String> = response.data.into_iter().map(|m| m.id).collect();

        info!("Found {} models from {}", models.len(), self.name());
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_conversion() {
        let msg = crate::llm::user_message("Hello");
        let openai_msg = OpenAIMessage::from(&msg);

        assert_eq!(openai_msg.role, "user");
        match openai_msg.content {
            OpenAIContent::Text(text) => assert_eq!(text, "Hello"),
            OpenAIContent::Parts(_) => panic!("text-only message should serialize as string"),
        }
    }

    #[test]
    fn test_vision_message_conversion() {
        let msg = Message::user_with_image("Count the rivets", "image/jpeg", "QUJD");
        let openai_msg = OpenAIMessage::from(&msg);

        let json = serde_json::to_value(&openai_msg).unwrap();
        assert_eq!(json["content"][0]["type"], "image_url");
        assert_eq!(
            json["content"][0]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
        assert_eq!(json["content"][1]["type"], "text");
    }
}
