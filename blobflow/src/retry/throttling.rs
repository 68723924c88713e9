//! Honours server throttling hints on 429 and 503 responses.

use super::{RetryDecision, RetryInformation, RetryStrategy};
use crate::http::PipelineResponse;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};

/// Delay hint in milliseconds.
pub const RETRY_AFTER_MS_HEADER: &str = "retry-after-ms";
/// Vendor delay hint in milliseconds.
pub const X_MS_RETRY_AFTER_MS_HEADER: &str = "x-ms-retry-after-ms";
/// Standard hint: seconds or an HTTP date.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

const THROTTLING_STATUSES: [u16; 2] = [429, 503];

fn header_as_number(response: &PipelineResponse, name: &str) -> Option<f64> {
    let value = response.headers.get(name)?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn millis(ms: f64) -> Duration {
    // Float to int casts saturate, so huge hints become u64::MAX nanoseconds.
    Duration::from_nanos((ms.max(0.0) * 1_000_000.0).round() as u64)
}

/// Returns the delay the server asked for, measured against `now`.
///
/// Only 429 and 503 responses are considered. Headers are checked in the
/// order `retry-after-ms`, `x-ms-retry-after-ms`, `Retry-After`; a
/// `Retry-After` that is not a number is parsed as an HTTP date.
#[must_use]
pub fn retry_after_at(response: &PipelineResponse, now: DateTime<Utc>) -> Option<Duration> {
    if !THROTTLING_STATUSES.contains(&response.status) {
        return None;
    }

    for (header, factor) in [
        (RETRY_AFTER_MS_HEADER, 1.0),
        (X_MS_RETRY_AFTER_MS_HEADER, 1.0),
        (RETRY_AFTER_HEADER, 1000.0),
    ] {
        if let Some(value) = header_as_number(response, header) {
            return Some(millis(value * factor));
        }
    }

    // RFC 1123, RFC 850 and asctime dates are all accepted.
    let value = response.headers.get(RETRY_AFTER_HEADER)?;
    let date = httpdate::parse_http_date(value.trim()).ok()?;
    Some(date.duration_since(SystemTime::from(now)).unwrap_or(Duration::ZERO))
}

/// Returns the delay the server asked for, if any.
#[must_use]
pub fn retry_after(response: &PipelineResponse) -> Option<Duration> {
    retry_after_at(response, Utc::now())
}

/// True if the response is a 429/503 carrying a usable delay hint.
#[must_use]
pub fn is_throttling_retry_response(response: &PipelineResponse) -> bool {
    retry_after(response).is_some()
}

/// Waits for as long as the server asked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottlingRetryStrategy;

impl RetryStrategy for ThrottlingRetryStrategy {
    fn name(&self) -> &str {
        "throttlingRetryStrategy"
    }

    fn retry(&self, info: RetryInformation<'_>) -> RetryDecision {
        info.effective_response()
            .and_then(retry_after)
            .map_or(RetryDecision::Skip, RetryDecision::RetryAfter)
    }
}
