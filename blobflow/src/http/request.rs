//! Outgoing request value.

use super::{HttpHeaders, HttpMethod};
use crate::cancellation::CancellationToken;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use url::{form_urlencoded, Url};
use uuid::Uuid;

/// A mutable description of one outgoing HTTP request.
///
/// Policies receive the request by value and may rewrite any field before
/// handing it on. Cloning is cheap: the body is reference counted and the
/// cancellation token is shared.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Target URL.
    pub url: Url,
    /// Request method.
    pub method: HttpMethod,
    /// Request headers.
    pub headers: HttpHeaders,
    /// Request body.
    pub body: Option<Bytes>,
    /// Client-side timeout for a single transport call.
    pub timeout: Option<Duration>,
    /// Unique id for correlating logs and server traces.
    pub request_id: String,
    /// Cooperative cancellation shared by every layer handling this request.
    pub cancellation: Option<Arc<CancellationToken>>,
}

impl PipelineRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HttpHeaders::new(),
            body: None,
            timeout: None,
            request_id: Uuid::new_v4().to_string(),
            cancellation: None,
        }
    }

    /// Creates a new request from a URL string.
    pub fn parse(method: HttpMethod, url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the transport timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns true if the attached token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    /// Returns the cancellation token, if any.
    #[must_use]
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_deref()
    }

    /// Replaces the host of the URL, keeping scheme, path and query.
    pub fn set_host(&mut self, host: &str) -> Result<(), url::ParseError> {
        self.url.set_host(Some(host))
    }

    /// Sets a query parameter, replacing any existing value for the name.
    ///
    /// Other parameters are kept exactly as they appear in the URL.
    pub fn set_query_parameter(&mut self, name: &str, value: &str) {
        let mut segments: Vec<String> = self
            .url
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|segment| {
                !segment.is_empty()
                    && !matches!(
                        form_urlencoded::parse(segment.as_bytes()).next(),
                        Some((key, _)) if key == name
                    )
            })
            .map(str::to_string)
            .collect();

        segments.push(
            form_urlencoded::Serializer::new(String::new())
                .append_pair(name, value)
                .finish(),
        );
        self.url.set_query(Some(&segments.join("&")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_has_id() {
        let a = PipelineRequest::parse(HttpMethod::Get, "https://a.blob.core.windows.net/c").unwrap();
        let b = PipelineRequest::parse(HttpMethod::Get, "https://a.blob.core.windows.net/c").unwrap();
        assert!(!a.request_id.is_empty());
        assert_ne!(a.request_id, b.request_id);
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_set_host() {
        let mut request = PipelineRequest::parse(
            HttpMethod::Get,
            "https://account.blob.core.windows.net/container/blob?snapshot=1",
        )
        .unwrap();
        request
            .set_host("account-secondary.blob.core.windows.net")
            .unwrap();

        assert_eq!(
            request.url.as_str(),
            "https://account-secondary.blob.core.windows.net/container/blob?snapshot=1"
        );
    }

    #[test]
    fn test_set_query_parameter_replaces() {
        let mut request =
            PipelineRequest::parse(HttpMethod::Get, "https://h/c?comp=list&timeout=5").unwrap();
        request.set_query_parameter("timeout", "30");

        let pairs: Vec<(String, String)> = request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("comp".to_string(), "list".to_string()),
                ("timeout".to_string(), "30".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_query_parameter_on_bare_url() {
        let mut request = PipelineRequest::parse(HttpMethod::Get, "https://h/c").unwrap();
        request.set_query_parameter("timeout", "4");
        assert_eq!(request.url.as_str(), "https://h/c?timeout=4");
    }

    #[test]
    fn test_set_query_parameter_keeps_other_segments() {
        let mut request = PipelineRequest::parse(
            HttpMethod::Get,
            "https://h/c?restype=container&comp&prefix=a%20b&timeout=9",
        )
        .unwrap();
        request.set_query_parameter("timeout", "4");
        assert_eq!(
            request.url.as_str(),
            "https://h/c?restype=container&comp&prefix=a%20b&timeout=4"
        );

        request.set_query_parameter("timeout", "3");
        assert_eq!(request.url.query(), Some("restype=container&comp&prefix=a%20b&timeout=3"));
    }

    #[test]
    fn test_cancellation_flag() {
        let token = Arc::new(CancellationToken::new());
        let request = PipelineRequest::parse(HttpMethod::Get, "https://h/c")
            .unwrap()
            .with_cancellation(token.clone());

        assert!(!request.is_cancelled());
        token.cancel("stop");
        assert!(request.is_cancelled());
    }
}
