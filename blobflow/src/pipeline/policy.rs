//! Policy contract and registration options.

use super::PipelinePhase;
use crate::errors::{PipelineError, PolicyOrderingError};
use crate::http::{HttpClient, PipelineRequest, PipelineResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One unit of pipeline middleware.
///
/// A policy receives the request and a [`Next`] handle to the rest of the
/// pipeline. It may modify the request, call `next.run` any number of times
/// (a retry policy calls it once per attempt), and inspect or replace the
/// response on the way out.
#[async_trait]
pub trait PipelinePolicy: Send + Sync {
    /// Unique name of the policy within a pipeline.
    fn name(&self) -> &str;

    /// Processes a request.
    async fn send_request(
        &self,
        request: PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, PipelineError>;
}

/// The remainder of a composed pipeline below the current policy.
///
/// `Next` holds the not-yet-run policies as a slice and the transport. It is
/// `Copy`, so a policy can invoke it repeatedly.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    client: &'a dyn HttpClient,
    policies: &'a [Arc<dyn PipelinePolicy>],
}

impl<'a> Next<'a> {
    /// Creates a handle that runs `policies` in order, then `client`.
    #[must_use]
    pub fn new(client: &'a dyn HttpClient, policies: &'a [Arc<dyn PipelinePolicy>]) -> Self {
        Self { client, policies }
    }

    /// Sends the request through the remaining policies and the transport.
    pub async fn run(self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        match self.policies.split_first() {
            Some((policy, rest)) => {
                let next = Next {
                    client: self.client,
                    policies: rest,
                };
                policy.send_request(request, next).await
            }
            None => self.client.send_request(request).await,
        }
    }

    /// Number of policies still to run before the transport.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.policies.len()
    }
}

impl std::fmt::Debug for dyn PipelinePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PipelinePolicy").field(&self.name()).finish()
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

/// Where a policy is placed when the pipeline is ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOptions {
    /// Phase the policy belongs to. `None` means [`PipelinePhase::Unphased`].
    #[serde(default)]
    pub phase: Option<PipelinePhase>,
    /// Run only once this phase has fully drained. Excludes `phase`.
    #[serde(default)]
    pub after_phase: Option<PipelinePhase>,
    /// Policies that must run after this one.
    #[serde(default)]
    pub before_policies: Vec<String>,
    /// Policies that must run before this one.
    #[serde(default)]
    pub after_policies: Vec<String>,
}

impl PolicyOptions {
    /// Options for a policy inside `phase`.
    #[must_use]
    pub fn in_phase(phase: PipelinePhase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::default()
        }
    }

    /// Options for an unphased policy gated on `phase` having drained.
    #[must_use]
    pub fn after_phase(phase: PipelinePhase) -> Self {
        Self {
            after_phase: Some(phase),
            ..Self::default()
        }
    }

    /// Sets the phase.
    #[must_use]
    pub fn with_phase(mut self, phase: PipelinePhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets the phase from its name.
    pub fn with_phase_name(self, phase: &str) -> Result<Self, PolicyOrderingError> {
        Ok(self.with_phase(phase.parse()?))
    }

    /// Sets the phase gate.
    #[must_use]
    pub fn with_after_phase(mut self, phase: PipelinePhase) -> Self {
        self.after_phase = Some(phase);
        self
    }

    /// Sets the phase gate from its name.
    pub fn with_after_phase_name(self, phase: &str) -> Result<Self, PolicyOrderingError> {
        Ok(self.with_after_phase(phase.parse()?))
    }

    /// Adds a policy that must run after this one.
    #[must_use]
    pub fn before(mut self, policy: impl Into<String>) -> Self {
        self.before_policies.push(policy.into());
        self
    }

    /// Adds a policy that must run before this one.
    #[must_use]
    pub fn after(mut self, policy: impl Into<String>) -> Self {
        self.after_policies.push(policy.into());
        self
    }

    /// The phase whose member set holds the policy.
    #[must_use]
    pub fn effective_phase(&self) -> PipelinePhase {
        self.phase.unwrap_or(PipelinePhase::Unphased)
    }

    /// Checks that `phase` and `after_phase` are not both set, and that the
    /// gate is a real phase. A policy gated on `Unphased` would wait on its
    /// own member set.
    pub fn validate(&self, policy: &str) -> Result<(), PolicyOrderingError> {
        if self.phase.is_some() && self.after_phase.is_some() {
            return Err(PolicyOrderingError::PhaseConflict {
                policy: policy.to_string(),
            });
        }
        if self.after_phase == Some(PipelinePhase::Unphased) {
            return Err(PolicyOrderingError::InvalidPhase(
                PipelinePhase::Unphased.as_str().to_string(),
            ));
        }
        Ok(())
    }
}
