//! HTTP-level tests for the provider clients, against a mock server

use std::sync::Arc;
use takeoff_engine::error::{EngineError, LlmError};
use takeoff_engine::llm::provider::{GenerationOptions, ProviderConfig, ProviderType};
use takeoff_engine::llm::providers::anthropic::AnthropicProvider;
use takeoff_engine::llm::providers::OpenAIProvider;
use takeoff_engine::llm::user_message;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn anthropic_config(base_url: String) -> ProviderConfig {
    ProviderConfig {
        provider: ProviderType::Anthropic,
        name: "anthropic".to_string(),
        priority: 1,
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url),
        text_model: "claude-3-5-sonnet-20241022".to_string(),
        embedding_model: None,
        supports_vision: true,
        max_tokens: 4000,
        temperature: 0.1,
        timeout: 5,
        input_cost_per_1k: 0.003,
        output_cost_per_1k: 0.015,
        options: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn test_anthropic_generate_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "msg_01",
            "content": [{"type": "text", "text": "{\"text\": \"extracted\"}"}],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 2000, "output_tokens": 1000}
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::create(anthropic_config(server.uri()));
    let response = provider
        .generate(&[user_message("analyze")], &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(response.text, "{\"text\": \"extracted\"}");
    assert_eq!(response.tokens_input, 2000);
    assert_eq!(response.tokens_output, 1000);
    // Cost derived from the configured per-1k rates
    assert!((response.cost_usd - (0.006 + 0.015)).abs() < 1e-9);
}

#[tokio::test]
async fn test_anthropic_auth_error_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::create(anthropic_config(server.uri()));
    let result = provider
        .generate(&[user_message("analyze")], &GenerationOptions::default())
        .await;

    match result {
        Err(EngineError::Llm(LlmError::Unauthorized(_))) => {}
        other => panic!("expected Unauthorized, got {:?}", other.err()),
    }
    // Authentication failures must not be retried
    assert!(!EngineError::Llm(LlmError::Unauthorized("".to_string())).is_retryable());
}

#[tokio::test]
async fn test_anthropic_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::create(anthropic_config(server.uri()));
    let result = provider
        .generate(&[user_message("analyze")], &GenerationOptions::default())
        .await;

    let error = result.err().unwrap();
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_openai_batch_embeddings() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"embedding": [0.3, 0.4], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ],
            "model": "text-embedding-3-small"
        })))
        .mount(&server)
        .await;

    let config = ProviderConfig {
        provider: ProviderType::OpenAI,
        name: "openai".to_string(),
        priority: 1,
        api_key: Some("test-key".to_string()),
        base_url: Some(server.uri()),
        text_model: "gpt-4o".to_string(),
        embedding_model: Some("text-embedding-3-small".to_string()),
        supports_vision: true,
        max_tokens: 4000,
        temperature: 0.1,
        timeout: 5,
        input_cost_per_1k: 0.0,
        output_cost_per_1k: 0.0,
        options: serde_json::Value::Null,
    };
    let provider: Arc<_> = OpenAIProvider::create(config);

    let batch = provider
        .embed_batch(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    // Results come back in input order regardless of response order
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].embedding, vec![0.1, 0.2]);
    assert_eq!(batch[1].embedding, vec![0.3, 0.4]);
    assert_eq!(batch[0].model, "text-embedding-3-small");
}
