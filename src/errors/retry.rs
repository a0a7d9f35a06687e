use std::time::Duration;
use std::future::Future;

use super::classification::ErrorClassification;
use super::types::VulnfixError;
use tracing::{warn, info};

impl ErrorClassification {
    /// Calculate the retry delay for this error classification based on the
    /// current attempt number (0-indexed).
    ///
    /// - RateLimitError: 30s + (attempt * 10s), capped at 120s
    /// - Default: exponential backoff 2^attempt + random jitter (0-1s), capped at 30s
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        match self.error_type {
            "RateLimitError" => {
                let secs = 30 + (attempt as u64 * 10);
                Duration::from_secs(secs.min(120))
            }
            _ => {
                let base: f64 = 2.0_f64.powi(attempt as i32);
                let jitter: f64 = rand::random::<f64>();
                let secs = (base + jitter).min(30.0);
                Duration::from_secs_f64(secs)
            }
        }
    }
}

/// Retry configuration for transient external calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// When false, retries happen immediately. Used by tests.
    pub backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: true,
        }
    }
}

/// Execute an async operation with retry logic.
///
/// Retries only if the error is classified as retryable and we haven't
/// exceeded max_retries.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, VulnfixError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VulnfixError>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable || attempt + 1 >= max_attempts {
                    if !classification.retryable {
                        warn!(
                            operation = operation_name,
                            error_type = classification.error_type,
                            error = %e,
                            "Non-retryable error"
                        );
                    } else {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Retries exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = if config.backoff {
                    classification.retry_delay(attempt)
                } else {
                    Duration::ZERO
                };
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
