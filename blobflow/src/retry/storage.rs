//! Retry policy for storage accounts with a read-only secondary endpoint.
//!
//! Read requests alternate between the primary host (odd attempts) and the
//! secondary host (even attempts). Once the secondary has answered 404 the
//! resource is assumed not to be replicated yet and every later attempt is
//! pinned to the primary.

use crate::cancellation::delay;
use crate::errors::{PipelineError, RestError, PARSE_ERROR};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::http::{PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Error names and codes that mark a transient network failure.
pub const RETRIABLE_NETWORK_ERRORS: [&str; 9] = [
    "ETIMEDOUT",
    "ESOCKETTIMEDOUT",
    "ECONNREFUSED",
    "ECONNRESET",
    "ENOENT",
    "ENOTFOUND",
    "TIMEOUT",
    "EPIPE",
    "REQUEST_SEND_ERROR",
];

/// Query parameter carrying the server-side timeout in seconds.
pub const TIMEOUT_QUERY_PARAMETER: &str = "timeout";

const UNCLOSED_ROOT_TAG: &str = "Error \"Error: Unclosed root tag";

/// Backoff shape between primary attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageRetryPolicyType {
    /// `(2^(attempt-1) - 1) * retry_delay`, capped at `max_retry_delay`.
    #[default]
    Exponential,
    /// Always `retry_delay`.
    Fixed,
}

/// Options for [`StorageRetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRetryOptions {
    /// Backoff shape.
    #[serde(default)]
    pub retry_policy_type: StorageRetryPolicyType,
    /// Total attempts, including the first.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    /// Base delay in milliseconds.
    #[serde(default = "default_retry_delay_in_ms")]
    pub retry_delay_in_ms: u64,
    /// Delay cap in milliseconds.
    #[serde(default = "default_max_retry_delay_in_ms")]
    pub max_retry_delay_in_ms: u64,
    /// Host of the read-only secondary endpoint.
    #[serde(default)]
    pub secondary_host: Option<String>,
    /// Server-side timeout per attempt, sent as whole seconds.
    #[serde(default)]
    pub try_timeout_in_ms: Option<u64>,
}

fn default_max_tries() -> u32 {
    4
}

fn default_retry_delay_in_ms() -> u64 {
    4 * 1000
}

fn default_max_retry_delay_in_ms() -> u64 {
    120 * 1000
}

impl Default for StorageRetryOptions {
    fn default() -> Self {
        Self {
            retry_policy_type: StorageRetryPolicyType::default(),
            max_tries: default_max_tries(),
            retry_delay_in_ms: default_retry_delay_in_ms(),
            max_retry_delay_in_ms: default_max_retry_delay_in_ms(),
            secondary_host: None,
            try_timeout_in_ms: None,
        }
    }
}

impl StorageRetryOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backoff shape.
    #[must_use]
    pub fn with_retry_policy_type(mut self, kind: StorageRetryPolicyType) -> Self {
        self.retry_policy_type = kind;
        self
    }

    /// Sets the total attempt count.
    #[must_use]
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
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

    /// Sets the secondary host.
    #[must_use]
    pub fn with_secondary_host(mut self, host: impl Into<String>) -> Self {
        self.secondary_host = Some(host.into());
        self
    }

    /// Sets the per-attempt server timeout.
    #[must_use]
    pub fn with_try_timeout_in_ms(mut self, ms: u64) -> Self {
        self.try_timeout_in_ms = Some(ms);
        self
    }

    /// Replaces unusable values with defaults.
    ///
    /// Zero counts and delays fall back to the defaults, an empty secondary
    /// host is dropped and the base delay is capped at the maximum delay.
    #[must_use]
    pub fn normalized(self) -> Self {
        let max_retry_delay_in_ms = if self.max_retry_delay_in_ms == 0 {
            default_max_retry_delay_in_ms()
        } else {
            self.max_retry_delay_in_ms
        };
        let retry_delay_in_ms = if self.retry_delay_in_ms == 0 {
            default_retry_delay_in_ms()
        } else {
            self.retry_delay_in_ms.min(max_retry_delay_in_ms)
        };

        Self {
            retry_policy_type: self.retry_policy_type,
            max_tries: if self.max_tries < 1 { default_max_tries() } else { self.max_tries },
            retry_delay_in_ms,
            max_retry_delay_in_ms,
            secondary_host: self.secondary_host.filter(|host| !host.is_empty()),
            try_timeout_in_ms: self.try_timeout_in_ms.filter(|&ms| ms > 0),
        }
    }
}

/// True if `error` names a transient network failure.
#[must_use]
pub fn is_network_error(error: &RestError) -> bool {
    let message = error.message.to_ascii_uppercase();
    let code = error.code.as_deref().map(str::to_ascii_uppercase);
    RETRIABLE_NETWORK_ERRORS
        .iter()
        .any(|name| message.contains(name) || code.as_deref() == Some(*name))
}

fn is_unclosed_root_tag(error: &RestError) -> bool {
    error.code.as_deref() == Some(PARSE_ERROR) && error.message.starts_with(UNCLOSED_ROOT_TAG)
}

/// A self-contained retry policy with primary/secondary failover.
pub struct StorageRetryPolicy {
    options: StorageRetryOptions,
    event_sink: Arc<dyn EventSink>,
}

impl StorageRetryPolicy {
    /// Creates the policy. Options are normalized first.
    #[must_use]
    pub fn new(options: StorageRetryOptions) -> Self {
        Self {
            options: options.normalized(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Reports retry decisions to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the normalized options.
    #[must_use]
    pub fn options(&self) -> &StorageRetryOptions {
        &self.options
    }

    /// Whether `attempt` (1-based) goes to the primary host.
    #[must_use]
    pub fn is_primary_attempt(&self, request: &PipelineRequest, attempt: u32, secondary_has_404: bool) -> bool {
        secondary_has_404
            || self.options.secondary_host.is_none()
            || !request.method.is_read_only()
            || attempt % 2 == 1
    }

    /// Whether the outcome of `attempt` should be retried.
    #[must_use]
    pub fn should_retry(
        &self,
        is_primary: bool,
        attempt: u32,
        outcome: &Result<PipelineResponse, PipelineError>,
    ) -> bool {
        if attempt >= self.options.max_tries {
            info!(attempt, max_tries = self.options.max_tries, "Storage retry attempts exhausted");
            return false;
        }

        let error = outcome.as_ref().err().and_then(PipelineError::as_rest);
        if error.is_some_and(is_network_error) {
            return true;
        }

        let status = match outcome {
            Ok(response) => Some(response.status),
            Err(_) => error.and_then(RestError::status),
        };
        match status {
            Some(404) if !is_primary => return true,
            Some(500 | 503) => return true,
            _ => {}
        }

        error.is_some_and(is_unclosed_root_tag)
    }

    /// The wait after `attempt` when the next attempt is `next_is_primary`.
    #[must_use]
    pub fn retry_delay(&self, is_primary: bool, next_is_primary: bool, attempt: u32) -> Duration {
        if is_primary != next_is_primary {
            return Duration::from_millis(rand::thread_rng().gen_range(0..=1000));
        }

        let ms = match self.options.retry_policy_type {
            StorageRetryPolicyType::Exponential => {
                let factor = 2u64.saturating_pow(attempt.saturating_sub(1)) - 1;
                factor
                    .saturating_mul(self.options.retry_delay_in_ms)
                    .min(self.options.max_retry_delay_in_ms)
            }
            StorageRetryPolicyType::Fixed => self.options.retry_delay_in_ms,
        };
        Duration::from_millis(ms)
    }

    fn prepare_attempt(&self, request: &PipelineRequest, is_primary: bool) -> Result<PipelineRequest, PipelineError> {
        let mut attempt_request = request.clone();
        if !is_primary {
            if let Some(host) = &self.options.secondary_host {
                attempt_request
                    .set_host(host)
                    .map_err(|e| PipelineError::Internal(format!("Invalid secondary host '{host}': {e}")))?;
            }
        }
        if let Some(ms) = self.options.try_timeout_in_ms {
            attempt_request.set_query_parameter(TIMEOUT_QUERY_PARAMETER, &(ms / 1000).to_string());
        }
        Ok(attempt_request)
    }
}

impl std::fmt::Debug for StorageRetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRetryPolicy")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelinePolicy for StorageRetryPolicy {
    fn name(&self) -> &str {
        "storageRetryPolicy"
    }

    async fn send_request(
        &self,
        request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        let mut attempt: u32 = 1;
        let mut secondary_has_404 = false;

        loop {
            let is_primary = self.is_primary_attempt(&request, attempt, secondary_has_404);
            let attempt_request = self.prepare_attempt(&request, is_primary)?;
            info!(
                attempt,
                primary = is_primary,
                url = %attempt_request.url,
                "Storage retry attempt"
            );
            self.event_sink.try_emit(
                events::RETRY_ATTEMPT,
                Some(json!({
                    "policy": self.name(),
                    "retry_count": attempt - 1,
                    "primary": is_primary,
                })),
            );

            let outcome = next.run(attempt_request).await;

            match &outcome {
                Ok(response) => debug!(attempt, status = response.status, "Storage attempt returned"),
                Err(err) => {
                    if err.as_rest().is_none() {
                        return outcome;
                    }
                    error!(attempt, error = %err, "Storage attempt failed");
                }
            }

            if request.is_cancelled() {
                self.event_sink.try_emit(
                    events::RETRY_ABORTED,
                    Some(json!({ "policy": self.name(), "retry_count": attempt - 1 })),
                );
                return Err(request
                    .cancellation_token()
                    .and_then(|token| token.reason())
                    .map_or_else(PipelineError::aborted, PipelineError::Aborted));
            }

            if !self.should_retry(is_primary, attempt, &outcome) {
                if attempt >= self.options.max_tries {
                    self.event_sink.try_emit(
                        events::RETRY_EXHAUSTED,
                        Some(json!({ "policy": self.name(), "retry_count": attempt - 1 })),
                    );
                }
                return outcome;
            }

            let status = match &outcome {
                Ok(response) => Some(response.status),
                Err(err) => err.as_rest().and_then(RestError::status),
            };
            if !is_primary && status == Some(404) {
                debug!(attempt, "Secondary returned 404, pinning to primary");
                secondary_has_404 = true;
            }

            let next_is_primary = self.is_primary_attempt(&request, attempt + 1, secondary_has_404);
            let wait = self.retry_delay(is_primary, next_is_primary, attempt);
            self.event_sink.try_emit(
                events::RETRY_SCHEDULED,
                Some(json!({
                    "policy": self.name(),
                    "retry_count": attempt - 1,
                    "delay_ms": u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "next_primary": next_is_primary,
                })),
            );
            delay(wait, request.cancellation_token()).await?;

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn request(method: HttpMethod) -> PipelineRequest {
        PipelineRequest::parse(method, "https://account.blob.core.windows.net/c/b").unwrap()
    }

    fn with_secondary() -> StorageRetryPolicy {
        StorageRetryPolicy::new(
            StorageRetryOptions::new().with_secondary_host("account-secondary.blob.core.windows.net"),
        )
    }

    #[test]
    fn test_defaults_and_normalization() {
        let options = StorageRetryOptions::default();
        assert_eq!(options.max_tries, 4);
        assert_eq!(options.retry_delay_in_ms, 4000);
        assert_eq!(options.max_retry_delay_in_ms, 120_000);
        assert_eq!(options.retry_policy_type, StorageRetryPolicyType::Exponential);

        let normalized = StorageRetryOptions::new()
            .with_max_tries(0)
            .with_retry_delay_in_ms(10_000)
            .with_max_retry_delay_in_ms(5_000)
            .with_secondary_host("")
            .normalized();
        assert_eq!(normalized.max_tries, 4);
        assert_eq!(normalized.retry_delay_in_ms, 5_000);
        assert_eq!(normalized.secondary_host, None);
    }

    #[test]
    fn test_primary_alternation() {
        let policy = with_secondary();
        let get = request(HttpMethod::Get);
        assert!(policy.is_primary_attempt(&get, 1, false));
        assert!(!policy.is_primary_attempt(&get, 2, false));
        assert!(policy.is_primary_attempt(&get, 3, false));
        assert!(policy.is_primary_attempt(&get, 4, true));

        assert!(policy.is_primary_attempt(&request(HttpMethod::Put), 2, false));
        assert!(!policy.is_primary_attempt(&request(HttpMethod::Head), 2, false));

        let no_secondary = StorageRetryPolicy::new(StorageRetryOptions::default());
        assert!(no_secondary.is_primary_attempt(&get, 2, false));
    }

    #[test]
    fn test_should_retry_statuses() {
        let policy = with_secondary();
        let ok = |status| Ok(PipelineResponse::new(request(HttpMethod::Get), status));

        assert!(policy.should_retry(true, 1, &ok(500)));
        assert!(policy.should_retry(true, 1, &ok(503)));
        assert!(!policy.should_retry(true, 1, &ok(502)));
        assert!(!policy.should_retry(true, 1, &ok(404)));
        assert!(policy.should_retry(false, 2, &ok(404)));
        assert!(!policy.should_retry(true, 1, &ok(200)));
        assert!(!policy.should_retry(true, 4, &ok(503)));
    }

    #[test]
    fn test_should_retry_errors() {
        let policy = with_secondary();
        let err = |e: RestError| Err(PipelineError::Rest(e));

        assert!(policy.should_retry(true, 1, &err(RestError::new("x").with_code("econnreset"))));
        assert!(policy.should_retry(true, 1, &err(RestError::new("socket hang up: EPIPE"))));
        assert!(policy.should_retry(
            true,
            1,
            &err(RestError::new("Error \"Error: Unclosed root tag\nLine: 0").with_code(PARSE_ERROR))
        ));
        assert!(!policy.should_retry(true, 1, &err(RestError::new("Unclosed root tag").with_code(PARSE_ERROR))));
        assert!(!policy.should_retry(true, 1, &err(RestError::new("forbidden").with_status_code(403))));
        assert!(policy.should_retry(true, 1, &err(RestError::new("busy").with_status_code(503))));
    }

    #[test]
    fn test_retry_delay_shapes() {
        let policy = StorageRetryPolicy::new(
            StorageRetryOptions::new()
                .with_retry_delay_in_ms(1000)
                .with_max_retry_delay_in_ms(5000),
        );
        assert_eq!(policy.retry_delay(true, true, 1), Duration::ZERO);
        assert_eq!(policy.retry_delay(true, true, 2), Duration::from_millis(1000));
        assert_eq!(policy.retry_delay(true, true, 3), Duration::from_millis(3000));
        assert_eq!(policy.retry_delay(true, true, 4), Duration::from_millis(5000));

        let fixed = StorageRetryPolicy::new(
            StorageRetryOptions::new()
                .with_retry_policy_type(StorageRetryPolicyType::Fixed)
                .with_retry_delay_in_ms(700),
        );
        assert_eq!(fixed.retry_delay(true, true, 3), Duration::from_millis(700));

        for _ in 0..20 {
            assert!(policy.retry_delay(true, false, 1) <= Duration::from_secs(1));
            assert!(policy.retry_delay(false, true, 2) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_prepare_attempt_sets_host_and_timeout() {
        let policy = StorageRetryPolicy::new(
            StorageRetryOptions::new()
                .with_secondary_host("account-secondary.blob.core.windows.net")
                .with_try_timeout_in_ms(4500),
        );
        let original = request(HttpMethod::Get);

        let secondary = policy.prepare_attempt(&original, false).unwrap();
        assert_eq!(
            secondary.url.as_str(),
            "https://account-secondary.blob.core.windows.net/c/b?timeout=4"
        );
        let primary = policy.prepare_attempt(&original, true).unwrap();
        assert_eq!(primary.url.host_str(), Some("account.blob.core.windows.net"));
        assert_eq!(original.url.query(), None);
    }
}
