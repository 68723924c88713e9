//! Mock transports and policies.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::http::{HttpClient, PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};

type Responder = Box<dyn FnOnce(PipelineRequest) -> Result<PipelineResponse, PipelineError> + Send>;

/// A transport that answers with a queue of scripted outcomes.
///
/// Every request is recorded. When the queue is empty the client answers
/// with the fallback status (200 unless changed).
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Responder>>,
    requests: Mutex<Vec<PipelineRequest>>,
    fallback_status: u16,
}

impl Default for ScriptedHttpClient {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fallback_status: 200,
        }
    }
}

impl ScriptedHttpClient {
    /// Creates a client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status used once the script runs out.
    #[must_use]
    pub fn with_fallback_status(mut self, status: u16) -> Self {
        self.fallback_status = status;
        self
    }

    /// Queues a bare response with `status`.
    pub fn push_status(&self, status: u16) -> &Self {
        self.push_with(move |request| Ok(PipelineResponse::new(request, status)))
    }

    /// Queues a response with `status` and `headers`.
    pub fn push_response(&self, status: u16, headers: &[(&str, &str)]) -> &Self {
        let headers: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.push_with(move |request| {
            let mut response = PipelineResponse::new(request, status);
            for (name, value) in headers {
                response.headers.set(name, value);
            }
            Ok(response)
        })
    }

    /// Queues an error.
    pub fn push_error(&self, error: impl Into<PipelineError>) -> &Self {
        let error = error.into();
        self.push_with(move |_| Err(error))
    }

    /// Queues a custom responder.
    pub fn push_with<F>(&self, responder: F) -> &Self
    where
        F: FnOnce(PipelineRequest) -> Result<PipelineResponse, PipelineError> + Send + 'static,
    {
        self.script.lock().push_back(Box::new(responder));
        self
    }

    /// Returns every request seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<PipelineRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests seen so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the hosts of every request seen so far.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.url.host_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl std::fmt::Debug for ScriptedHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedHttpClient")
            .field("queued", &self.script.lock().len())
            .field("requests", &self.request_count())
            .field("fallback_status", &self.fallback_status)
            .finish()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send_request(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        self.requests.lock().push(request.clone());
        let responder = self.script.lock().pop_front();
        match responder {
            Some(responder) => responder(request),
            None => Ok(PipelineResponse::new(request, self.fallback_status)),
        }
    }
}

/// A log shared between several [`RecordingPolicy`] instances.
pub type SharedLog = Arc<Mutex<Vec<String>>>;

/// A policy that appends `<name>-in` and `<name>-out` to a shared log.
#[derive(Debug, Clone)]
pub struct RecordingPolicy {
    name: String,
    log: SharedLog,
}

impl RecordingPolicy {
    /// Creates a policy writing to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: SharedLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }

    /// Creates an empty shared log.
    #[must_use]
    pub fn shared_log() -> SharedLog {
        Arc::new(Mutex::new(Vec::new()))
    }
}

#[async_trait]
impl PipelinePolicy for RecordingPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_request(
        &self,
        request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        self.log.lock().push(format!("{}-in", self.name));
        let result = next.run(request).await;
        self.log.lock().push(format!("{}-out", self.name));
        result
    }
}
