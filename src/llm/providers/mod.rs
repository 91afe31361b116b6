//! LLM provider implementations
//!
//! This module contains concrete implementations for the supported providers.

pub mod anthropic;
pub mod base;
pub mod openai;
pub mod openai_compatible;

// Re-export commonly used types
pub use anthropic::AnthropicProvider;
pub use base::{HttpProviderClient, OpenAICompatible};
pub use openai::OpenAIProvider;
pub use openai_compatible::OpenAICompatibleProvider;
