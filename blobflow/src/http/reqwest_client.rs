//! `reqwest` backed transport.

use super::{HttpClient, HttpHeaders, PipelineRequest, PipelineResponse};
use crate::errors::{PipelineError, RestError, REQUEST_SEND_ERROR};
use async_trait::async_trait;

/// An [`HttpClient`] that sends requests with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a transport with a default `reqwest::Client`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_error(err: &reqwest::Error) -> PipelineError {
    let code = if err.is_timeout() {
        "ETIMEDOUT"
    } else if err.is_connect() {
        "ECONNREFUSED"
    } else {
        REQUEST_SEND_ERROR
    };
    RestError::new(err.to_string()).with_code(code).into()
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send_request(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let sent = match request.cancellation_token() {
            Some(token) => {
                tokio::select! {
                    result = builder.send() => result,
                    () = token.cancelled() => return Err(PipelineError::aborted()),
                }
            }
            None => builder.send().await,
        };
        let response = sent.map_err(|e| map_error(&e))?;

        let status = response.status().as_u16();
        let mut headers = HttpHeaders::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.set(name.as_str(), value);
            }
        }
        let body = response.bytes().await.map_err(|e| map_error(&e))?;

        Ok(PipelineResponse {
            status,
            headers,
            body: Some(body),
            request,
        })
    }
}
