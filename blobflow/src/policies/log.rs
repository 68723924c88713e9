//! Request and response logging with redaction.

use crate::errors::PipelineError;
use crate::http::{HttpHeaders, PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{info, warn};
use url::Url;

/// Replacement for values that are not allowed to be logged.
pub const REDACTED: &str = "REDACTED";

const DEFAULT_ALLOWED_HEADERS: [&str; 28] = [
    "x-ms-client-request-id",
    "x-ms-return-client-request-id",
    "x-ms-useragent",
    "x-ms-correlation-request-id",
    "x-ms-request-id",
    "client-request-id",
    "ms-cv",
    "return-client-request-id",
    "traceparent",
    "accept",
    "cache-control",
    "connection",
    "content-length",
    "content-type",
    "date",
    "etag",
    "expires",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-unmodified-since",
    "last-modified",
    "pragma",
    "request-id",
    "retry-after",
    "server",
    "transfer-encoding",
    "user-agent",
];

const DEFAULT_ALLOWED_QUERY_PARAMETERS: [&str; 1] = ["api-version"];

/// Options for [`LogPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    /// Extra header names whose values may be logged.
    #[serde(default)]
    pub additional_allowed_header_names: Vec<String>,
    /// Extra query parameters whose values may be logged.
    #[serde(default)]
    pub additional_allowed_query_parameters: Vec<String>,
}

/// Redacts header values and query parameters outside the allow lists.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowed_headers: HashSet<String>,
    allowed_query_parameters: HashSet<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(&LogOptions::default())
    }
}

impl Sanitizer {
    /// Builds the allow lists from the defaults plus `options`.
    #[must_use]
    pub fn new(options: &LogOptions) -> Self {
        let allowed_headers = DEFAULT_ALLOWED_HEADERS
            .iter()
            .map(|h| (*h).to_string())
            .chain(options.additional_allowed_header_names.iter().cloned())
            .map(|h| h.to_ascii_lowercase())
            .collect();
        let allowed_query_parameters = DEFAULT_ALLOWED_QUERY_PARAMETERS
            .iter()
            .map(|q| (*q).to_string())
            .chain(options.additional_allowed_query_parameters.iter().cloned())
            .map(|q| q.to_ascii_lowercase())
            .collect();
        Self {
            allowed_headers,
            allowed_query_parameters,
        }
    }

    /// Returns the headers with disallowed values replaced.
    #[must_use]
    pub fn sanitize_headers(&self, headers: &HttpHeaders) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                let shown = if self.allowed_headers.contains(&name.to_ascii_lowercase()) {
                    value
                } else {
                    REDACTED
                };
                (name.to_string(), shown.to_string())
            })
            .collect()
    }

    /// Returns the URL with disallowed query values replaced.
    #[must_use]
    pub fn sanitize_url(&self, url: &Url) -> String {
        if url.query().is_none() {
            return url.to_string();
        }

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| {
                let shown = if self.allowed_query_parameters.contains(&key.to_ascii_lowercase()) {
                    value.into_owned()
                } else {
                    REDACTED.to_string()
                };
                (key.into_owned(), shown)
            })
            .collect();

        let mut sanitized = url.clone();
        sanitized.query_pairs_mut().clear().extend_pairs(pairs);
        sanitized.to_string()
    }
}

/// Logs every request and its outcome through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogPolicy {
    sanitizer: Sanitizer,
}

impl LogPolicy {
    /// Creates the policy.
    #[must_use]
    pub fn new(options: &LogOptions) -> Self {
        Self {
            sanitizer: Sanitizer::new(options),
        }
    }
}

#[async_trait]
impl PipelinePolicy for LogPolicy {
    fn name(&self) -> &str {
        "logPolicy"
    }

    async fn send_request(
        &self,
        request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        info!(
            request_id = %request.request_id,
            method = %request.method,
            url = %self.sanitizer.sanitize_url(&request.url),
            headers = ?self.sanitizer.sanitize_headers(&request.headers),
            "Request"
        );

        let started = Instant::now();
        let request_id = request.request_id.clone();
        let result = next.run(request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => info!(
                request_id = %request_id,
                status = response.status,
                elapsed_ms,
                headers = ?self.sanitizer.sanitize_headers(&response.headers),
                "Response"
            ),
            Err(err) => warn!(request_id = %request_id, elapsed_ms, error = %err, "Request failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::testing::ScriptedHttpClient;
    use std::sync::Arc;

    #[test]
    fn test_sanitize_headers() {
        let headers: HttpHeaders = [
            ("Authorization", "Bearer secret"),
            ("Content-Type", "application/xml"),
            ("x-ms-meta-owner", "alice"),
        ]
        .into_iter()
        .collect();

        let sanitized = Sanitizer::default().sanitize_headers(&headers);
        assert_eq!(sanitized["Authorization"], REDACTED);
        assert_eq!(sanitized["Content-Type"], "application/xml");
        assert_eq!(sanitized["x-ms-meta-owner"], REDACTED);

        let relaxed = Sanitizer::new(&LogOptions {
            additional_allowed_header_names: vec!["X-Ms-Meta-Owner".to_string()],
            ..LogOptions::default()
        });
        assert_eq!(relaxed.sanitize_headers(&headers)["x-ms-meta-owner"], "alice");
    }

    #[test]
    fn test_sanitize_url() {
        let url = Url::parse("https://a.blob.core.windows.net/c?sig=abc&api-version=2021&comp=list").unwrap();
        let sanitized = Sanitizer::default().sanitize_url(&url);
        assert_eq!(
            sanitized,
            "https://a.blob.core.windows.net/c?sig=REDACTED&api-version=2021&comp=REDACTED"
        );

        let plain = Url::parse("https://a.blob.core.windows.net/c").unwrap();
        assert_eq!(Sanitizer::default().sanitize_url(&plain), plain.as_str());
    }

    #[tokio::test]
    async fn test_policy_passes_outcome_through() {
        let client = ScriptedHttpClient::new();
        client.push_status(404);
        let policies: Vec<Arc<dyn PipelinePolicy>> = vec![Arc::new(LogPolicy::new(&LogOptions::default()))];
        let request = PipelineRequest::parse(HttpMethod::Get, "https://example.com/?sig=x").unwrap();

        let response = Next::new(&client, &policies).run(request).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(client.requests()[0].url.query(), Some("sig=x"));
    }
}
