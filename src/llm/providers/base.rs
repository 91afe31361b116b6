//! Shared HTTP transport for cloud LLM providers
//!
//! Extraction calls ship multi-megabyte page images, so provider requests
//! here are long-lived POSTs whose failures must be classified for the retry
//! layer: authentication failures fail the whole extraction fast, while rate
//! limits and server faults are worth retrying before a page is given up on.

use crate::error::{LlmError, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// Classify a non-success provider status for the retry policy
///
/// 401/403 are permanent (bad key, never retried); 429 and 5xx are
/// transient; anything else is a plain generation failure.
pub fn status_to_error(status: StatusCode, body: String) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthorized(body),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        status if status.is_server_error() => LlmError::ServerError(body),
        _ => LlmError::GenerationFailed(body),
    }
}

/// HTTP client shared by the provider implementations
pub struct HttpProviderClient {
    client: Client,
    timeout: Duration,
}

impl HttpProviderClient {
    /// Create a client with a per-request timeout in seconds
    pub fn new(timeout_secs: u64) -> Self {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, timeout }
    }

    /// POST a JSON body and deserialize the JSON response
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, String)],
    ) -> Result<R> {
        debug!("POST {}", url);
        self.dispatch(apply_headers(self.client.post(url), headers).json(body))
            .await
    }

    /// GET and deserialize the JSON response
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<R> {
        debug!("GET {}", url);
        self.dispatch(apply_headers(self.client.get(url), headers))
            .await
    }

    /// Send a prepared request, classify failures, and decode the body
    async fn dispatch<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {} error", status));
            error!("Provider error ({}): {}", status, body);
            return Err(status_to_error(status, body).into());
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()).into())
    }
}

fn apply_headers(mut request: RequestBuilder, headers: &[(&str, String)]) -> RequestBuilder {
    for (key, value) in headers {
        request = request.header(*key, value.as_str());
    }
    request
}

/// Adapter trait for endpoints speaking the OpenAI chat-completions dialect
///
/// Covers the hosted OpenAI API as well as self-hosted vision gateways that
/// mimic it; an adapter only states where the endpoint lives and how to
/// authenticate against it.
pub trait OpenAICompatible {
    /// Base URL of the API, with or without a trailing slash
    fn base_url(&self) -> &str;

    /// API key, when the endpoint requires one
    fn api_key(&self) -> Option<&str>;

    /// Headers sent with every request: JSON content type plus bearer auth
    fn request_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Content-Type", "application/json".to_string())];
        if let Some(key) = self.api_key() {
            headers.push(("Authorization", format!("Bearer {}", key)));
        }
        headers
    }

    /// Absolute URL for an endpoint path like `chat/completions`
    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A self-hosted vision gateway fronting a local takeoff model
    struct DrawingGatewayAdapter {
        api_key: Option<String>,
    }

    impl OpenAICompatible for DrawingGatewayAdapter {
        fn base_url(&self) -> &str {
            "http://takeoff-gateway:9000/v1/"
        }

        fn api_key(&self) -> Option<&str> {
            self.api_key.as_deref()
        }
    }

    #[test]
    fn test_endpoint_urls_normalize_slashes() {
        let adapter = DrawingGatewayAdapter { api_key: None };

        assert_eq!(
            adapter.build_url("chat/completions"),
            "http://takeoff-gateway:9000/v1/chat/completions"
        );
        assert_eq!(
            adapter.build_url("/embeddings"),
            "http://takeoff-gateway:9000/v1/embeddings"
        );
    }

    #[test]
    fn test_bearer_header_only_when_key_present() {
        let open = DrawingGatewayAdapter { api_key: None };
        let headers = open.request_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "Content-Type");

        let keyed = DrawingGatewayAdapter {
            api_key: Some("gateway-secret".to_string()),
        };
        let headers = keyed.request_headers();
        assert!(headers
            .iter()
            .any(|(k, v)| *k == "Authorization" && v == "Bearer gateway-secret"));
    }

    #[test]
    fn test_status_classification_for_retry_policy() {
        // A bad key must fail the extraction fast
        let auth = status_to_error(StatusCode::UNAUTHORIZED, "invalid x-api-key".to_string());
        assert!(!auth.is_retryable());
        assert!(matches!(auth, LlmError::Unauthorized(_)));

        let forbidden = status_to_error(StatusCode::FORBIDDEN, "key disabled".to_string());
        assert!(!forbidden.is_retryable());

        // Rate limits and provider faults are retried before a page is dropped
        assert!(status_to_error(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(
            status_to_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string())
                .is_retryable()
        );

        // Other client errors are neither auth nor transient
        let odd = status_to_error(StatusCode::UNPROCESSABLE_ENTITY, "bad request".to_string());
        assert!(!odd.is_retryable());
        assert!(matches!(odd, LlmError::GenerationFailed(_)));
    }
}
