//! Language model integration
//!
//! Core message and response types shared by all providers. Messages are
//! multimodal: a message body is a sequence of text and image parts, so the
//! same conversation type serves both plain takeoff prompts and vision
//! extraction requests.

pub mod metrics;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod router;

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a message body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Base64-encoded image with its MIME type (e.g. "image/jpeg")
    Image {
        media_type: String,
        data: String,
    },
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    /// Create a text-only message
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text {
                text: content.into(),
            }],
        }
    }

    /// Create a user message pairing an image with an instruction
    pub fn user_with_image(
        text: impl Into<String>,
        media_type: impl Into<String>,
        base64_data: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentPart::Image {
                    media_type: media_type.into(),
                    data: base64_data.into(),
                },
                ContentPart::Text { text: text.into() },
            ],
        }
    }

    /// Concatenated text parts of the message
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the message carries at least one image part
    pub fn has_image(&self) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, ContentPart::Image { .. }))
    }
}

/// Response from text generation
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Embedding response
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub model: String,
}

/// Helper function to create a system message
pub fn system_message(content: impl Into<String>) -> Message {
    Message::text(Role::System, content)
}

/// Helper function to create a user message
pub fn user_message(content: impl Into<String>) -> Message {
    Message::text(Role::User, content)
}

/// Helper function to create an assistant message
pub fn assistant_message(content: impl Into<String>) -> Message {
    Message::text(Role::Assistant, content)
}
