//! Strategy contract for the retry engine.

use crate::errors::{PipelineError, RestError};
use crate::http::PipelineResponse;
use std::fmt;
use std::time::Duration;
use url::Url;

/// The outcome of one attempt, as seen by a strategy.
#[derive(Debug, Clone, Copy)]
pub struct RetryInformation<'a> {
    /// Zero-based attempt index.
    pub retry_count: u32,
    /// The response, if the attempt produced one.
    pub response: Option<&'a PipelineResponse>,
    /// The error, if the attempt failed.
    pub response_error: Option<&'a RestError>,
}

impl<'a> RetryInformation<'a> {
    /// The response of the attempt, or the response attached to its error.
    #[must_use]
    pub fn effective_response(&self) -> Option<&'a PipelineResponse> {
        self.response
            .or_else(|| self.response_error.and_then(RestError::response))
    }
}

/// What a strategy wants the engine to do next.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Defer to the next strategy.
    Skip,
    /// Wait, then send the request again.
    RetryAfter(Duration),
    /// Stop and fail with this error.
    ErrorToThrow(PipelineError),
    /// Send the request again to another URL, without waiting.
    RedirectTo(Url),
}

impl RetryDecision {
    /// Creates a delay decision from milliseconds.
    #[must_use]
    pub fn retry_after_ms(ms: u64) -> Self {
        Self::RetryAfter(Duration::from_millis(ms))
    }

    /// Returns true for [`RetryDecision::Skip`].
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

impl fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::RetryAfter(delay) => write!(f, "retry after {}ms", delay.as_millis()),
            Self::ErrorToThrow(err) => write!(f, "throw: {err}"),
            Self::RedirectTo(url) => write!(f, "redirect to {url}"),
        }
    }
}

/// A pure decision function consulted after each attempt.
pub trait RetryStrategy: Send + Sync {
    /// Strategy name used in logs and events.
    fn name(&self) -> &str;

    /// Decides what to do with the outcome of one attempt.
    fn retry(&self, info: RetryInformation<'_>) -> RetryDecision;
}
