//! Transport contract consumed by the pipeline.

use super::{PipelineRequest, PipelineResponse};
use crate::errors::PipelineError;
use async_trait::async_trait;
use std::sync::Arc;

/// The transport at the bottom of every pipeline.
///
/// Implementations send the request and return whatever the server answered,
/// including non-2xx statuses. Connection level failures should be reported as
/// [`crate::errors::RestError`] values carrying a `code`, so that retry
/// strategies can recognise them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    async fn send_request(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    async fn send_request(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        (**self).send_request(request).await
    }
}
