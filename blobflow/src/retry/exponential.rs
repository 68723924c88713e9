//! Capped exponential backoff with half jitter.

use super::throttling::is_throttling_retry_response;
use super::{RetryDecision, RetryInformation, RetryStrategy};
use crate::errors::{PipelineError, RestError};
use crate::http::PipelineResponse;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection error codes treated as transient.
pub const SYSTEM_ERROR_CODES: [&str; 6] = [
    "ETIMEDOUT",
    "ESOCKETTIMEDOUT",
    "ECONNREFUSED",
    "ECONNRESET",
    "ENOENT",
    "ENOTFOUND",
];

/// Options for [`ExponentialRetryStrategy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExponentialRetryStrategyOptions {
    /// Base delay in milliseconds.
    #[serde(default = "default_retry_delay_in_ms")]
    pub retry_delay_in_ms: u64,
    /// Upper bound for the computed delay.
    #[serde(default = "default_max_retry_delay_in_ms")]
    pub max_retry_delay_in_ms: u64,
    /// Defer connection errors to other strategies.
    #[serde(default)]
    pub ignore_system_errors: bool,
    /// Defer retryable HTTP statuses to other strategies.
    #[serde(default)]
    pub ignore_http_status_codes: bool,
}

fn default_retry_delay_in_ms() -> u64 {
    1000
}

fn default_max_retry_delay_in_ms() -> u64 {
    64_000
}

impl Default for ExponentialRetryStrategyOptions {
    fn default() -> Self {
        Self {
            retry_delay_in_ms: default_retry_delay_in_ms(),
            max_retry_delay_in_ms: default_max_retry_delay_in_ms(),
            ignore_system_errors: false,
            ignore_http_status_codes: false,
        }
    }
}

impl ExponentialRetryStrategyOptions {
    /// Creates options with the default delays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_retry_delay_in_ms(mut self, ms: u64) -> Self {
        self.retry_delay_in_ms = ms;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_retry_delay_in_ms(mut self, ms: u64) -> Self {
        self.max_retry_delay_in_ms = ms;
        self
    }

    /// Sets whether connection errors are ignored.
    #[must_use]
    pub fn with_ignore_system_errors(mut self, ignore: bool) -> Self {
        self.ignore_system_errors = ignore;
        self
    }

    /// Sets whether HTTP status codes are ignored.
    #[must_use]
    pub fn with_ignore_http_status_codes(mut self, ignore: bool) -> Self {
        self.ignore_http_status_codes = ignore;
        self
    }
}

/// True for 408 and 5xx other than 501 and 505.
#[must_use]
pub fn is_exponential_retry_response(response: Option<&PipelineResponse>) -> bool {
    response.is_some_and(|r| (r.status >= 500 || r.status == 408) && r.status != 501 && r.status != 505)
}

/// True if the error carries one of [`SYSTEM_ERROR_CODES`].
#[must_use]
pub fn is_system_error(error: Option<&RestError>) -> bool {
    error
        .and_then(|e| e.code.as_deref())
        .is_some_and(|code| SYSTEM_ERROR_CODES.contains(&code))
}

/// Computes the delay before retry `retry_attempt` (zero-based).
///
/// The result lies in `[clamped / 2, clamped]` where
/// `clamped = min(max_delay_ms, base_delay_ms * 2^retry_attempt)`.
#[must_use]
pub fn calculate_retry_delay(retry_attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> Duration {
    let exponential = base_delay_ms.saturating_mul(2u64.saturating_pow(retry_attempt));
    let clamped = exponential.min(max_delay_ms);

    // Half of an odd millisecond count is kept exact in microseconds.
    let half_us = clamped.saturating_mul(1000) / 2;
    let jitter_ms = rand::thread_rng().gen_range(0..=clamped / 2);
    Duration::from_micros(half_us.saturating_add(jitter_ms.saturating_mul(1000)))
}

/// Retries 408/5xx responses and connection failures with capped backoff.
///
/// Throttling responses and statuses it does not recognise are left to other
/// strategies. An error that is neither a connection failure nor a retryable
/// status is thrown immediately.
#[derive(Debug, Clone, Default)]
pub struct ExponentialRetryStrategy {
    options: ExponentialRetryStrategyOptions,
}

impl ExponentialRetryStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(options: ExponentialRetryStrategyOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &ExponentialRetryStrategyOptions {
        &self.options
    }
}

impl RetryStrategy for ExponentialRetryStrategy {
    fn name(&self) -> &str {
        "exponentialRetryStrategy"
    }

    fn retry(&self, info: RetryInformation<'_>) -> RetryDecision {
        let response = info.effective_response();
        let system_error = is_system_error(info.response_error);
        let exponential = is_exponential_retry_response(response);

        let unknown_response = response.is_some_and(|r| is_throttling_retry_response(r) || !exponential);
        let ignored_status = exponential && self.options.ignore_http_status_codes;
        let ignored_error = system_error && self.options.ignore_system_errors;
        if unknown_response || ignored_status || ignored_error {
            return RetryDecision::Skip;
        }

        if let Some(error) = info.response_error {
            if !system_error && !exponential {
                return RetryDecision::ErrorToThrow(PipelineError::Rest(error.clone()));
            }
        }

        RetryDecision::RetryAfter(calculate_retry_delay(
            info.retry_count,
            self.options.retry_delay_in_ms,
            self.options.max_retry_delay_in_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, PipelineRequest};

    fn response(status: u16) -> PipelineResponse {
        let request = PipelineRequest::parse(HttpMethod::Get, "https://account.blob.core.windows.net/c").unwrap();
        PipelineResponse::new(request, status)
    }

    fn decide(strategy: &ExponentialRetryStrategy, response: Option<&PipelineResponse>, error: Option<&RestError>) -> RetryDecision {
        strategy.retry(RetryInformation {
            retry_count: 0,
            response,
            response_error: error,
        })
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 500, 502, 503, 504, 599] {
            assert!(is_exponential_retry_response(Some(&response(status))), "{status}");
        }
        for status in [200, 400, 404, 429, 501, 505] {
            assert!(!is_exponential_retry_response(Some(&response(status))), "{status}");
        }
        assert!(!is_exponential_retry_response(None));
    }

    #[test]
    fn test_delay_bounds() {
        for attempt in 0..10 {
            let clamped = (100u64 * 2u64.pow(attempt)).min(3000);
            for _ in 0..50 {
                let delay = calculate_retry_delay(attempt, 100, 3000);
                assert!(delay >= Duration::from_micros(clamped * 500), "attempt {attempt}: {delay:?}");
                assert!(delay <= Duration::from_millis(clamped), "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_delay_saturates_on_huge_attempts() {
        let delay = calculate_retry_delay(200, 1000, 64_000);
        assert!(delay >= Duration::from_secs(32));
        assert!(delay <= Duration::from_secs(64));
    }

    #[test]
    fn test_retries_server_error() {
        let strategy = ExponentialRetryStrategy::default();
        let decision = decide(&strategy, Some(&response(500)), None);
        assert!(matches!(decision, RetryDecision::RetryAfter(d) if d >= Duration::from_millis(500) && d <= Duration::from_secs(1)));
    }

    #[test]
    fn test_skips_throttling_and_unknown_responses() {
        let strategy = ExponentialRetryStrategy::default();
        let throttled = response(503).with_header("Retry-After", "2");
        assert!(decide(&strategy, Some(&throttled), None).is_skip());
        assert!(decide(&strategy, Some(&response(404)), None).is_skip());
        assert!(decide(&strategy, Some(&response(200)), None).is_skip());
    }

    #[test]
    fn test_system_errors() {
        let strategy = ExponentialRetryStrategy::default();
        let error = RestError::new("reset").with_code("ECONNRESET");
        assert!(matches!(decide(&strategy, None, Some(&error)), RetryDecision::RetryAfter(_)));

        let ignoring = ExponentialRetryStrategy::new(
            ExponentialRetryStrategyOptions::new().with_ignore_system_errors(true),
        );
        assert!(decide(&ignoring, None, Some(&error)).is_skip());
    }

    #[test]
    fn test_ignore_http_status_codes() {
        let strategy = ExponentialRetryStrategy::new(
            ExponentialRetryStrategyOptions::new().with_ignore_http_status_codes(true),
        );
        assert!(decide(&strategy, Some(&response(502)), None).is_skip());
    }

    #[test]
    fn test_unrecognised_error_is_thrown() {
        let strategy = ExponentialRetryStrategy::default();
        let error = RestError::new("bad certificate").with_code("CERT_INVALID");
        match decide(&strategy, None, Some(&error)) {
            RetryDecision::ErrorToThrow(PipelineError::Rest(thrown)) => {
                assert_eq!(thrown.message, "bad certificate");
            }
            other => panic!("unexpected decision: {other}"),
        }
    }

    #[test]
    fn test_options_defaults_from_empty_json() {
        let options: ExponentialRetryStrategyOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ExponentialRetryStrategyOptions::default());
        assert_eq!(options.retry_delay_in_ms, 1000);
        assert_eq!(options.max_retry_delay_in_ms, 64_000);
    }
}
