//! Retry helper for transient provider failures
//!
//! Retries up to the configured attempt count with exponential backoff.
//! Authentication failures are never retried.

use crate::config::RetryConfig;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run an operation with retries on transient failures
pub async fn with_retries<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_secs(config.initial_backoff_secs);
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                warn!(
                    "{} attempt {}/{} failed ({}), retrying in {:?}",
                    operation_name, attempt, config.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    // Unreachable with max_attempts >= 1, but keep the compiler satisfied
    Err(last_error.expect("retry loop exited without an error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, LlmError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let attempts = AtomicU32::new(0);

        let result: Result<u32> = with_retries(&fast_config(), "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::Llm(LlmError::Timeout))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_errors_fail_fast() {
        let attempts = AtomicU32::new(0);

        let result: Result<u32> = with_retries(&fast_config(), "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Llm(LlmError::Unauthorized("bad key".to_string()))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let result: Result<u32> = with_retries(&fast_config(), "test", || async {
            Err(EngineError::Llm(LlmError::Timeout))
        })
        .await;

        match result {
            Err(EngineError::Llm(LlmError::Timeout)) => {}
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
