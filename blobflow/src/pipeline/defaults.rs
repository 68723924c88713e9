//! Standard pipeline assemblies.

use super::{Pipeline, PipelinePhase, PolicyOptions};
use crate::errors::PolicyOrderingError;
use crate::policies::{
    BearerTokenPolicy, LogOptions, LogPolicy, RedirectOptions, RedirectPolicy, RequestIdPolicy,
    TokenCredential, UserAgentOptions, UserAgentPolicy,
};
use crate::retry::{default_retry_policy, RetryOptions, StorageRetryOptions, StorageRetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A credential plus the scopes to request for it.
#[derive(Clone)]
pub struct BearerTokenOptions {
    /// Token source.
    pub credential: Arc<dyn TokenCredential>,
    /// Scopes passed to the credential.
    pub scopes: Vec<String>,
}

impl BearerTokenOptions {
    /// Creates the options.
    #[must_use]
    pub fn new(credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Self {
        Self { credential, scopes }
    }
}

impl std::fmt::Debug for BearerTokenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenOptions")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Options for [`create_pipeline_from_options`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Generic retry settings.
    #[serde(default)]
    pub retry_options: RetryOptions,
    /// Redirect settings.
    #[serde(default)]
    pub redirect_options: RedirectOptions,
    /// User agent settings.
    #[serde(default)]
    pub user_agent_options: UserAgentOptions,
    /// Logging allow lists.
    #[serde(default)]
    pub log_options: LogOptions,
    /// Adds a bearer token policy when set.
    #[serde(skip)]
    pub bearer_token: Option<BearerTokenOptions>,
}

impl PipelineOptions {
    /// Sets the retry settings.
    #[must_use]
    pub fn with_retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = options;
        self
    }

    /// Sets the redirect settings.
    #[must_use]
    pub fn with_redirect_options(mut self, options: RedirectOptions) -> Self {
        self.redirect_options = options;
        self
    }

    /// Sets the user agent settings.
    #[must_use]
    pub fn with_user_agent_options(mut self, options: UserAgentOptions) -> Self {
        self.user_agent_options = options;
        self
    }

    /// Sets the logging allow lists.
    #[must_use]
    pub fn with_log_options(mut self, options: LogOptions) -> Self {
        self.log_options = options;
        self
    }

    /// Enables bearer token authentication.
    #[must_use]
    pub fn with_bearer_token(mut self, options: BearerTokenOptions) -> Self {
        self.bearer_token = Some(options);
        self
    }
}

/// Options for [`create_storage_pipeline`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageClientOptions {
    /// Dual-endpoint retry settings.
    #[serde(default)]
    pub retry_options: StorageRetryOptions,
    /// Redirect settings.
    #[serde(default)]
    pub redirect_options: RedirectOptions,
    /// User agent settings.
    #[serde(default)]
    pub user_agent_options: UserAgentOptions,
    /// Logging allow lists.
    #[serde(default)]
    pub log_options: LogOptions,
    /// Adds a bearer token policy when set.
    #[serde(skip)]
    pub bearer_token: Option<BearerTokenOptions>,
}

impl StorageClientOptions {
    /// Sets the retry settings.
    #[must_use]
    pub fn with_retry_options(mut self, options: StorageRetryOptions) -> Self {
        self.retry_options = options;
        self
    }

    /// Sets the redirect settings.
    #[must_use]
    pub fn with_redirect_options(mut self, options: RedirectOptions) -> Self {
        self.redirect_options = options;
        self
    }

    /// Sets the user agent settings.
    #[must_use]
    pub fn with_user_agent_options(mut self, options: UserAgentOptions) -> Self {
        self.user_agent_options = options;
        self
    }

    /// Sets the logging allow lists.
    #[must_use]
    pub fn with_log_options(mut self, options: LogOptions) -> Self {
        self.log_options = options;
        self
    }

    /// Enables bearer token authentication.
    #[must_use]
    pub fn with_bearer_token(mut self, options: BearerTokenOptions) -> Self {
        self.bearer_token = Some(options);
        self
    }
}

fn add_outer_policies(
    pipeline: &mut Pipeline,
    user_agent: &UserAgentOptions,
) -> Result<(), PolicyOrderingError> {
    pipeline.add_policy(RequestIdPolicy::default(), PolicyOptions::default())?;
    pipeline.add_policy(UserAgentPolicy::new(user_agent), PolicyOptions::default())
}

fn add_inner_policies(
    pipeline: &mut Pipeline,
    redirect: &RedirectOptions,
    log: &LogOptions,
    bearer_token: Option<&BearerTokenOptions>,
) -> Result<(), PolicyOrderingError> {
    pipeline.add_policy(
        RedirectPolicy::new(redirect.clone()),
        PolicyOptions::after_phase(PipelinePhase::Retry),
    )?;
    pipeline.add_policy(LogPolicy::new(log), PolicyOptions::after_phase(PipelinePhase::Retry))?;
    if let Some(bearer) = bearer_token {
        pipeline.add_policy(
            BearerTokenPolicy::new(bearer.credential.clone(), bearer.scopes.clone()),
            PolicyOptions::in_phase(PipelinePhase::Sign),
        )?;
    }
    Ok(())
}

/// Builds the standard pipeline around the generic retry engine.
///
/// Resulting order: request id, user agent, retry, redirect, log and, when a
/// credential is configured, bearer token.
pub fn create_pipeline_from_options(options: &PipelineOptions) -> Result<Pipeline, PolicyOrderingError> {
    let mut pipeline = Pipeline::new();
    add_outer_policies(&mut pipeline, &options.user_agent_options)?;
    pipeline.add_policy(
        default_retry_policy(options.retry_options.clone()),
        PolicyOptions::in_phase(PipelinePhase::Retry),
    )?;
    add_inner_policies(
        &mut pipeline,
        &options.redirect_options,
        &options.log_options,
        options.bearer_token.as_ref(),
    )?;
    pipeline.ordered_policies()?;
    Ok(pipeline)
}

/// Builds the storage pipeline, with [`StorageRetryPolicy`] in the retry phase.
pub fn create_storage_pipeline(options: &StorageClientOptions) -> Result<Pipeline, PolicyOrderingError> {
    let mut pipeline = Pipeline::new();
    add_outer_policies(&mut pipeline, &options.user_agent_options)?;
    pipeline.add_policy(
        StorageRetryPolicy::new(options.retry_options.clone()),
        PolicyOptions::in_phase(PipelinePhase::Retry),
    )?;
    add_inner_policies(
        &mut pipeline,
        &options.redirect_options,
        &options.log_options,
        options.bearer_token.as_ref(),
    )?;
    pipeline.ordered_policies()?;
    Ok(pipeline)
}
