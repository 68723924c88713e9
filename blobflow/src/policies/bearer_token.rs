//! Bearer token authentication.

use crate::errors::PipelineError;
use crate::http::{PipelineRequest, PipelineResponse};
use crate::pipeline::{Next, PipelinePolicy};
use async_trait::async_trait;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// A token is refreshed once it is this close to expiring.
pub const REFRESH_WINDOW_SECONDS: i64 = 2 * 60;

/// A bearer token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The token value.
    pub token: String,
    /// When the token stops being valid.
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// True if the token expires within the refresh window of `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - now <= TimeDelta::seconds(REFRESH_WINDOW_SECONDS)
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Obtains a token valid for `scopes`.
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, PipelineError>;
}

/// Adds `Authorization: Bearer <token>` to every request.
///
/// The token is cached and shared by concurrent requests; it is fetched again
/// when it comes within two minutes of expiry.
pub struct BearerTokenPolicy {
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
    cached: Mutex<Option<AccessToken>>,
}

impl BearerTokenPolicy {
    /// Creates the policy.
    #[must_use]
    pub fn new(credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Self {
        Self {
            credential,
            scopes,
            cached: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, PipelineError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.needs_refresh(Utc::now()) {
                return Ok(token.token.clone());
            }
        }

        debug!(scopes = ?self.scopes, "Fetching access token");
        let fresh = self.credential.get_token(&self.scopes).await?;
        let value = fresh.token.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

impl std::fmt::Debug for BearerTokenPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenPolicy")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelinePolicy for BearerTokenPolicy {
    fn name(&self) -> &str {
        "bearerTokenAuthenticationPolicy"
    }

    async fn send_request(
        &self,
        mut request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError> {
        if request.url.scheme() != "https" {
            return Err(PipelineError::Authentication(
                "Bearer token authentication is not permitted for non-TLS protected (non-https) URLs."
                    .to_string(),
            ));
        }

        let token = self.token().await?;
        request.headers.set("Authorization", format!("Bearer {token}"));
        next.run(request).await
    }
}
