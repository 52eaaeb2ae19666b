//! Shared retry and timeout utilities for HTTP backends
//!
//! Retry behaviour lives here, never in the conversation core:
//! - Linear backoff with jitter by default (exponential as an option)
//! - Long request timeouts (180 seconds) for slow completions
//! - At most 30 seconds of waiting between retries
//! - 429 responses honour `retry-after`; 5xx and network errors retry;
//!   other 4xx responses fail immediately

use crate::llm::LlmError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Standard timeout and retry constants for LLM APIs
pub mod constants {
    /// Default timeout for LLM API calls (180 seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

    /// Maximum waiting time between retries (30 seconds)
    pub const MAX_RETRY_DELAY_MS: u64 = 30000;

    /// Default base delay for linear backoff (1 second)
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

    /// Default maximum retry attempts
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
}

/// Retry configuration for API requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Whether to use exponential (true) or linear (false) backoff
    pub use_exponential: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        create_standard_retry_config()
    }
}

/// Add ±10% jitter and cap at the configured maximum
fn with_jitter(delay: u64, config: &RetryConfig) -> u64 {
    let jitter_range = delay / 10;
    let with_jitter = if jitter_range == 0 {
        delay
    } else {
        let jitter = rand::random::<u64>() % (jitter_range * 2);
        delay.saturating_add(jitter).saturating_sub(jitter_range)
    };
    with_jitter.min(config.max_delay_ms)
}

/// Calculate exponential backoff delay with jitter
pub fn calculate_exponential_backoff(attempt: u32, config: &RetryConfig) -> u64 {
    if attempt == 0 {
        return 0;
    }

    // delay = base * 2^(attempt-1)
    let exponent = attempt.saturating_sub(1);
    let exponential_delay = config
        .base_delay_ms
        .saturating_mul(2_u64.saturating_pow(exponent));

    with_jitter(exponential_delay, config)
}

/// Calculate linear backoff delay with jitter
pub fn calculate_linear_backoff(attempt: u32, config: &RetryConfig) -> u64 {
    if attempt == 0 {
        return 0;
    }

    let linear_delay = config.base_delay_ms.saturating_mul(attempt as u64);
    with_jitter(linear_delay, config)
}

/// Calculate backoff delay based on configuration
pub fn calculate_backoff_delay(attempt: u32, config: &RetryConfig) -> u64 {
    if config.use_exponential {
        calculate_exponential_backoff(attempt, config)
    } else {
        calculate_linear_backoff(attempt, config)
    }
}

/// Creates the standard retry configuration: linear backoff, 180s timeout,
/// 30s maximum delay, 5 attempts
pub fn create_standard_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
        base_delay_ms: constants::DEFAULT_BASE_DELAY_MS,
        max_delay_ms: constants::MAX_RETRY_DELAY_MS,
        timeout_secs: constants::DEFAULT_TIMEOUT_SECS,
        use_exponential: false,
    }
}

/// Delay before retrying a 429 response. A server-supplied `retry-after`
/// is honoured up to `max_delay_ms`.
pub fn rate_limit_delay(retry_after: Option<u64>, attempt: u32, config: &RetryConfig) -> u64 {
    match retry_after {
        Some(seconds) => seconds.saturating_mul(1000).min(config.max_delay_ms),
        None => calculate_backoff_delay(attempt, config),
    }
}

/// Send an API request, retrying transient failures.
///
/// `prepare_request` is called once per attempt since a `RequestBuilder`
/// cannot be reused after sending.
pub async fn send_api_request_with_retry<T, F>(
    prepare_request: F,
    config: &RetryConfig,
    provider_name: &str,
) -> Result<T, LlmError>
where
    T: serde::de::DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempts = 0;
    let timeout = Duration::from_secs(config.timeout_secs);

    loop {
        if attempts > 0 {
            warn!(
                "Retry attempt {} of {} for {} API call",
                attempts, config.max_attempts, provider_name
            );
        }

        let response = prepare_request().timeout(timeout).send().await;

        match response {
            Ok(res) => {
                debug!("{} API response status: {}", provider_name, res.status());

                if res.status().is_success() {
                    // Read the body first so it can be logged on parse failure
                    let response_body = res.text().await.map_err(|e| {
                        LlmError::ApiError(format!(
                            "Failed to read {} response body: {}",
                            provider_name, e
                        ))
                    })?;

                    return serde_json::from_str::<T>(&response_body).map_err(|e| {
                        error!(
                            "Failed to parse {} response. Error: {}. Body:\n{}",
                            provider_name, e, response_body
                        );
                        LlmError::ApiError(format!(
                            "Failed to parse {} response: {}",
                            provider_name, e
                        ))
                    });
                } else if res.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    attempts += 1;
                    let retry_after = res
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok());

                    if attempts >= config.max_attempts {
                        return Err(LlmError::RateLimitError { retry_after });
                    }

                    let delay_ms = rate_limit_delay(retry_after, attempts, config);
                    match retry_after {
                        Some(seconds) => warn!(
                            "Rate limit exceeded. Server requested retry after {} seconds, waiting {} ms",
                            seconds, delay_ms
                        ),
                        None => warn!("Rate limit exceeded. Retrying in {} ms", delay_ms),
                    }

                    sleep(Duration::from_millis(delay_ms)).await;
                    continue;
                } else if res.status().is_server_error() {
                    attempts += 1;
                    let status = res.status();
                    if attempts >= config.max_attempts {
                        let error_text = res
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown server error".to_string());

                        return Err(LlmError::ApiError(format!(
                            "Max retries reached. {} server error {}: {}",
                            provider_name, status, error_text
                        )));
                    }

                    let delay_ms = calculate_backoff_delay(attempts, config);
                    warn!(
                        "{} API server error {}. Retrying in {} ms (attempt {}/{})",
                        provider_name, status, delay_ms, attempts, config.max_attempts
                    );

                    sleep(Duration::from_millis(delay_ms)).await;
                    continue;
                } else {
                    // Other client errors are not retried
                    let status = res.status();
                    let error_text = res
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());

                    return Err(LlmError::ApiError(format!(
                        "{} HTTP error {}: {}",
                        provider_name, status, error_text
                    )));
                }
            }
            Err(err) => {
                attempts += 1;

                if attempts >= config.max_attempts {
                    if err.is_timeout() {
                        return Err(LlmError::ApiError(format!(
                            "{} request timed out after {} seconds and {} attempts",
                            provider_name, config.timeout_secs, config.max_attempts
                        )));
                    }
                    return Err(LlmError::ApiError(format!(
                        "Max retries reached. Network error: {}",
                        err
                    )));
                }

                let delay_ms = calculate_backoff_delay(attempts, config);
                if err.is_timeout() {
                    warn!(
                        "{} API request timed out after {} seconds. Retrying in {} ms (attempt {}/{})",
                        provider_name, config.timeout_secs, delay_ms, attempts, config.max_attempts
                    );
                } else {
                    warn!(
                        "Network error: {}. Retrying in {} ms (attempt {}/{})",
                        err, delay_ms, attempts, config.max_attempts
                    );
                }

                sleep(Duration::from_millis(delay_ms)).await;
                continue;
            }
        }
    }
}
