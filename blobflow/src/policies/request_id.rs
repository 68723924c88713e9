//! Stamps every request with a client request id.

use crate::errors::PipelineError;
use crate::http::{PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};
use async_trait::async_trait;

/// Header carrying the client request id.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Sets the request id header when the caller has not set one.
#[derive(Debug, Clone)]
pub struct RequestIdPolicy {
    header_name: String,
}

impl Default for RequestIdPolicy {
    fn default() -> Self {
        Self::new(CLIENT_REQUEST_ID_HEADER)
    }
}

impl RequestIdPolicy {
    /// Creates a policy writing `header_name`.
    #[must_use]
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }
}

#[async_trait]
impl PipelinePolicy for RequestIdPolicy {
    fn name(&self) -> &str {
        "requestIdPolicy"
    }

    async fn send_request(
        &self,
        mut request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        if !request.headers.contains(&self.header_name) {
            let id = request.request_id.clone();
            request.headers.set(self.header_name.clone(), id);
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::testing::ScriptedHttpClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sets_header_from_request_id() {
        let client = ScriptedHttpClient::new();
        let policies: Vec<Arc<dyn PipelinePolicy>> = vec![Arc::new(RequestIdPolicy::default())];
        let request = PipelineRequest::parse(HttpMethod::Get, "https://example.com/").unwrap();
        let id = request.request_id.clone();

        Next::new(&client, &policies).run(request).await.unwrap();
        assert_eq!(client.requests()[0].headers.get(CLIENT_REQUEST_ID_HEADER), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_keeps_caller_header() {
        let client = ScriptedHttpClient::new();
        let policies: Vec<Arc<dyn PipelinePolicy>> = vec![Arc::new(RequestIdPolicy::new("x-custom-id"))];
        let request = PipelineRequest::parse(HttpMethod::Get, "https://example.com/")
            .unwrap()
            .with_header("X-Custom-Id", "mine");

        Next::new(&client, &policies).run(request).await.unwrap();
        assert_eq!(client.requests()[0].headers.get("x-custom-id"), Some("mine"));
    }
}
