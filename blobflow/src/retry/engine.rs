//! The generic retry loop.

use super::{
    ExponentialRetryStrategy, ExponentialRetryStrategyOptions, RetryDecision, RetryInformation,
    RetryStrategy, ThrottlingRetryStrategy,
};
use crate::cancellation::delay;
use crate::errors::PipelineError;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::http::{PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Retries after the first attempt. The request is sent at most
    /// `max_retries + 1` times.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

impl RetryOptions {
    /// Creates options with the default retry count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// A pipeline policy that re-sends requests as directed by its strategies.
///
/// After every attempt the strategies are asked in order; the first one that
/// does not skip decides. When every strategy skips, or `max_retries` is
/// reached, the outcome of the last attempt is returned unchanged.
pub struct RetryPolicy {
    name: String,
    strategies: Vec<Arc<dyn RetryStrategy>>,
    options: RetryOptions,
    event_sink: Arc<dyn EventSink>,
}

impl RetryPolicy {
    /// Creates a retry policy named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, strategies: Vec<Arc<dyn RetryStrategy>>, options: RetryOptions) -> Self {
        Self {
            name: name.into(),
            strategies,
            options,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Reports retry decisions to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Returns the strategy names in evaluation order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn decide(&self, info: RetryInformation<'_>) -> RetryDecision {
        for strategy in &self.strategies {
            let decision = strategy.retry(info);
            if decision.is_skip() {
                debug!(policy = %self.name, strategy = strategy.name(), "Strategy skipped");
                continue;
            }

            info!(
                policy = %self.name,
                strategy = strategy.name(),
                retry_count = info.retry_count,
                decision = %decision,
                "Retry strategy decided"
            );
            self.event_sink.try_emit(
                events::RETRY_STRATEGY,
                Some(json!({
                    "policy": self.name,
                    "strategy": strategy.name(),
                    "decision": decision.to_string(),
                })),
            );
            return decision;
        }
        RetryDecision::Skip
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("strategies", &self.strategy_names())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn status_of(outcome: &Result<PipelineResponse, PipelineError>) -> Option<u16> {
    match outcome {
        Ok(response) => Some(response.status),
        Err(err) => err.as_rest().and_then(|e| e.status()),
    }
}

#[async_trait]
impl PipelinePolicy for RetryPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_request(
        &self,
        mut request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        let mut retry_count: u32 = 0;

        loop {
            debug!(policy = %self.name, retry_count, request_id = %request.request_id, "Sending attempt");
            self.event_sink.try_emit(
                events::RETRY_ATTEMPT,
                Some(json!({ "policy": self.name, "retry_count": retry_count })),
            );

            let outcome = next.run(request.clone()).await;

            if let Err(err) = &outcome {
                if err.as_rest().is_none() {
                    debug!(policy = %self.name, error = %err, "Error is not retryable");
                    return outcome;
                }
            }

            if request.is_cancelled() {
                warn!(policy = %self.name, retry_count, "Request cancelled, not retrying");
                self.event_sink.try_emit(
                    events::RETRY_ABORTED,
                    Some(json!({ "policy": self.name, "retry_count": retry_count })),
                );
                return Err(request
                    .cancellation_token()
                    .and_then(|token| token.reason())
                    .map_or_else(PipelineError::aborted, PipelineError::Aborted));
            }

            if retry_count >= self.options.max_retries {
                info!(policy = %self.name, retry_count, "Maximum retries reached");
                self.event_sink.try_emit(
                    events::RETRY_EXHAUSTED,
                    Some(json!({
                        "policy": self.name,
                        "retry_count": retry_count,
                        "status": status_of(&outcome),
                    })),
                );
                return outcome;
            }

            let response_error = outcome.as_ref().err().and_then(PipelineError::as_rest);
            let response = match &outcome {
                Ok(response) => Some(response),
                Err(_) => response_error.and_then(|e| e.response()),
            };
            let info = RetryInformation {
                retry_count,
                response,
                response_error,
            };

            match self.decide(info) {
                RetryDecision::Skip => return outcome,
                RetryDecision::ErrorToThrow(err) => return Err(err),
                RetryDecision::RetryAfter(wait) => {
                    self.event_sink.try_emit(
                        events::RETRY_SCHEDULED,
                        Some(json!({
                            "policy": self.name,
                            "retry_count": retry_count,
                            "delay_ms": u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        })),
                    );
                    delay(wait, request.cancellation_token()).await?;
                }
                RetryDecision::RedirectTo(url) => {
                    self.event_sink.try_emit(
                        events::RETRY_SCHEDULED,
                        Some(json!({
                            "policy": self.name,
                            "retry_count": retry_count,
                            "redirect": url.as_str(),
                        })),
                    );
                    request.url = url;
                }
            }

            retry_count += 1;
        }
    }
}

/// Builds a retry policy from an ordered list of strategies.
#[must_use]
pub fn retry_policy(strategies: Vec<Arc<dyn RetryStrategy>>, options: RetryOptions) -> RetryPolicy {
    RetryPolicy::new("retryPolicy", strategies, options)
}

/// Throttling hints first, then exponential backoff.
#[must_use]
pub fn default_retry_policy(options: RetryOptions) -> RetryPolicy {
    RetryPolicy::new(
        "defaultRetryPolicy",
        vec![
            Arc::new(ThrottlingRetryStrategy),
            Arc::new(ExponentialRetryStrategy::default()),
        ],
        options,
    )
}

/// Exponential backoff only.
#[must_use]
pub fn exponential_retry_policy(
    strategy_options: ExponentialRetryStrategyOptions,
    options: RetryOptions,
) -> RetryPolicy {
    RetryPolicy::new(
        "exponentialRetryPolicy",
        vec![Arc::new(ExponentialRetryStrategy::new(strategy_options))],
        options,
    )
}

/// Throttling hints only.
#[must_use]
pub fn throttling_retry_policy(options: RetryOptions) -> RetryPolicy {
    RetryPolicy::new(
        "throttlingRetryPolicy",
        vec![Arc::new(ThrottlingRetryStrategy)],
        options,
    )
}

/// Exponential backoff on connection failures only.
#[must_use]
pub fn system_error_retry_policy(
    strategy_options: ExponentialRetryStrategyOptions,
    options: RetryOptions,
) -> RetryPolicy {
    RetryPolicy::new(
        "systemErrorRetryPolicy",
        vec![Arc::new(ExponentialRetryStrategy::new(
            strategy_options.with_ignore_http_status_codes(true),
        ))],
        options,
    )
}
