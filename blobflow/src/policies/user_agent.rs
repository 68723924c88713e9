//! Sets the `User-Agent` header.

use crate::errors::PipelineError;
use crate::http::{PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Header name.
pub const USER_AGENT_HEADER: &str = "User-Agent";

/// Options for [`UserAgentPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentOptions {
    /// Prepended to the generated value.
    #[serde(default)]
    pub user_agent_prefix: Option<String>,
}

impl UserAgentOptions {
    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }
}

/// Returns `"blobflow/<version> (<os>-<arch>)"`, prefixed when configured.
#[must_use]
pub fn user_agent_value(prefix: Option<&str>) -> String {
    let base = format!(
        "blobflow/{} ({}-{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix} {base}"),
        _ => base,
    }
}

/// Sets `User-Agent` unless the request already has one.
#[derive(Debug, Clone)]
pub struct UserAgentPolicy {
    value: String,
}

impl UserAgentPolicy {
    /// Creates the policy.
    #[must_use]
    pub fn new(options: &UserAgentOptions) -> Self {
        Self {
            value: user_agent_value(options.user_agent_prefix.as_deref()),
        }
    }

    /// The header value this policy sets.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

#[async_trait]
impl PipelinePolicy for UserAgentPolicy {
    fn name(&self) -> &str {
        "userAgentPolicy"
    }

    async fn send_request(
        &self,
        mut request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        if !request.headers.contains(USER_AGENT_HEADER) {
            request.headers.set(USER_AGENT_HEADER, self.value.clone());
        }
        next.run(request).await
    }
}
