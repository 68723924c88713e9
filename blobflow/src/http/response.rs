//! Incoming response value.

use super::{HttpHeaders, PipelineRequest};
use bytes::Bytes;

/// The response to a [`PipelineRequest`].
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HttpHeaders,
    /// Buffered response body.
    pub body: Option<Bytes>,
    /// The request as it was sent by the transport.
    pub request: PipelineRequest,
}

impl PipelineResponse {
    /// Creates a response with no headers or body.
    #[must_use]
    pub fn new(request: PipelineRequest, status: u16) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: None,
            request,
        }
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

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
