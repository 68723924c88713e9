//! The policy registry and request dispatch.

use super::ordering::order_policies;
use super::{Next, PipelinePhase, PipelinePolicy, PolicyOptions};
use crate::errors::{PipelineError, PolicyOrderingError};
use crate::http::{HttpClient, PipelineRequest, PipelineResponse};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Policies in execution order, outermost first.
pub type OrderedPolicies = Arc<[Arc<dyn PipelinePolicy>]>;

/// Selects policies to remove. An entry matches if its name equals `name`
/// or its phase equals `phase`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePolicyOptions {
    /// Policy name to match.
    #[serde(default)]
    pub name: Option<String>,
    /// Phase to match. Unphased and phase-gated policies match `Unphased`.
    #[serde(default)]
    pub phase: Option<PipelinePhase>,
}

impl RemovePolicyOptions {
    /// Matches the policy called `name`.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            phase: None,
        }
    }

    /// Matches every policy in `phase`.
    #[must_use]
    pub fn by_phase(phase: PipelinePhase) -> Self {
        Self {
            name: None,
            phase: Some(phase),
        }
    }

    fn matches(&self, policy: &dyn PipelinePolicy, options: &PolicyOptions) -> bool {
        self.name.as_deref() == Some(policy.name()) || self.phase == Some(options.effective_phase())
    }
}

/// An ordered set of policies wrapped around a transport.
///
/// Policies are registered with [`PolicyOptions`] and ordered lazily on the
/// first dispatch. The ordering is cached until the next mutation, so
/// concurrent `send_request` calls share it.
#[derive(Default)]
pub struct Pipeline {
    entries: Vec<(Arc<dyn PipelinePolicy>, PolicyOptions)>,
    ordered: RwLock<Option<OrderedPolicies>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy.
    ///
    /// # Errors
    ///
    /// Returns `PhaseConflict` if both `phase` and `after_phase` are set.
    /// Duplicate names are only detected when the pipeline is ordered.
    pub fn add_policy<P>(&mut self, policy: P, options: PolicyOptions) -> Result<(), PolicyOrderingError>
    where
        P: PipelinePolicy + 'static,
    {
        self.add_shared_policy(Arc::new(policy), options)
    }

    /// Registers a policy that is already behind an `Arc`.
    pub fn add_shared_policy(
        &mut self,
        policy: Arc<dyn PipelinePolicy>,
        options: PolicyOptions,
    ) -> Result<(), PolicyOrderingError> {
        options.validate(policy.name())?;
        debug!(policy = policy.name(), phase = %options.effective_phase(), "Adding policy");
        self.entries.push((policy, options));
        self.invalidate();
        Ok(())
    }

    /// Builder-style [`Pipeline::add_policy`].
    pub fn with_policy<P>(mut self, policy: P, options: PolicyOptions) -> Result<Self, PolicyOrderingError>
    where
        P: PipelinePolicy + 'static,
    {
        self.add_policy(policy, options)?;
        Ok(self)
    }

    /// Removes every policy matching `options` and returns them.
    pub fn remove_policy(&mut self, options: &RemovePolicyOptions) -> Vec<Arc<dyn PipelinePolicy>> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(policy, entry_options)| options.matches(policy.as_ref(), entry_options));
        self.entries = kept;
        self.invalidate();
        removed.into_iter().map(|(policy, _)| policy).collect()
    }

    /// Returns the registered policies in registration order.
    #[must_use]
    pub fn policies(&self) -> Vec<Arc<dyn PipelinePolicy>> {
        self.entries.iter().map(|(policy, _)| policy.clone()).collect()
    }

    /// Returns the number of registered policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no policies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the policies in execution order, computing it if needed.
    ///
    /// Repeated calls without an intervening mutation return the same `Arc`.
    pub fn ordered_policies(&self) -> Result<OrderedPolicies, PolicyOrderingError> {
        if let Some(ordered) = self.ordered.read().as_ref() {
            return Ok(ordered.clone());
        }

        let mut cache = self.ordered.write();
        if let Some(ordered) = cache.as_ref() {
            return Ok(ordered.clone());
        }
        let ordered: OrderedPolicies = order_policies(&self.entries)?.into();
        debug!(
            order = ?ordered.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "Resolved policy order"
        );
        *cache = Some(ordered.clone());
        Ok(ordered)
    }

    /// Sends `request` through every policy and then `client`.
    ///
    /// The first policy in execution order is the outermost layer.
    pub async fn send_request(
        &self,
        client: &dyn HttpClient,
        request: PipelineRequest,
    ) -> Result<PipelineResponse, PipelineError> {
        let ordered = self.ordered_policies()?;
        Next::new(client, &ordered).run(request).await
    }

    fn invalidate(&mut self) {
        *self.ordered.get_mut() = None;
    }
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            ordered: RwLock::new(None),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "policies",
                &self
                    .entries
                    .iter()
                    .map(|(policy, options)| (policy.name(), options.effective_phase()))
                    .collect::<Vec<_>>(),
            )
            .field("ordered", &self.ordered.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPolicy;
    use pretty_assertions::assert_eq;

    fn names(policies: &[Arc<dyn PipelinePolicy>]) -> Vec<&str> {
        policies.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_add_policy_rejects_phase_conflict() {
        let log = RecordingPolicy::shared_log();
        let mut pipeline = Pipeline::new();
        let err = pipeline
            .add_policy(
                RecordingPolicy::new("p", log),
                PolicyOptions::in_phase(PipelinePhase::Retry).with_after_phase(PipelinePhase::Sign),
            )
            .unwrap_err();
        assert!(matches!(err, PolicyOrderingError::PhaseConflict { .. }));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_add_policy_rejects_unphased_gate() {
        let log = RecordingPolicy::shared_log();
        let mut pipeline = Pipeline::new();
        let err = pipeline
            .add_policy(RecordingPolicy::new("n", log), PolicyOptions::after_phase(PipelinePhase::Unphased))
            .unwrap_err();
        assert_eq!(err, PolicyOrderingError::InvalidPhase("None".to_string()));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_debug_lists_ordered_policies() {
        let log = RecordingPolicy::shared_log();
        let pipeline = Pipeline::new()
            .with_policy(RecordingPolicy::new("a", log.clone()), PolicyOptions::default())
            .unwrap()
            .with_policy(RecordingPolicy::new("b", log), PolicyOptions::in_phase(PipelinePhase::Serialize))
            .unwrap();
        let ordered = pipeline.ordered_policies().unwrap();
        assert_eq!(
            format!("{:?}", ordered),
            r#"[PipelinePolicy("b"), PipelinePolicy("a")]"#
        );
    }

    #[test]
    fn test_ordering_is_cached_and_invalidated() {
        let log = RecordingPolicy::shared_log();
        let mut pipeline = Pipeline::new()
            .with_policy(RecordingPolicy::new("a", log.clone()), PolicyOptions::default())
            .unwrap();

        let first = pipeline.ordered_policies().unwrap();
        let second = pipeline.ordered_policies().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        pipeline
            .add_policy(RecordingPolicy::new("b", log), PolicyOptions::in_phase(PipelinePhase::Serialize))
            .unwrap();
        let third = pipeline.ordered_policies().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(names(&third), vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_names_fail_at_ordering() {
        let log = RecordingPolicy::shared_log();
        let mut pipeline = Pipeline::new();
        pipeline.add_policy(RecordingPolicy::new("x", log.clone()), PolicyOptions::default()).unwrap();
        pipeline.add_policy(RecordingPolicy::new("x", log), PolicyOptions::default()).unwrap();

        assert_eq!(pipeline.len(), 2);
        assert_eq!(
            pipeline.ordered_policies().unwrap_err(),
            PolicyOrderingError::DuplicatePolicyName("x".to_string())
        );
    }

    #[test]
    fn test_remove_policy_matches_name_or_phase() {
        let log = RecordingPolicy::shared_log();
        let mut pipeline = Pipeline::new();
        pipeline.add_policy(RecordingPolicy::new("a", log.clone()), PolicyOptions::default()).unwrap();
        pipeline
            .add_policy(RecordingPolicy::new("b", log.clone()), PolicyOptions::in_phase(PipelinePhase::Sign))
            .unwrap();
        pipeline
            .add_policy(RecordingPolicy::new("c", log.clone()), PolicyOptions::in_phase(PipelinePhase::Retry))
            .unwrap();
        pipeline
            .add_policy(RecordingPolicy::new("d", log), PolicyOptions::in_phase(PipelinePhase::Sign))
            .unwrap();
        let before = pipeline.ordered_policies().unwrap();

        let removed = pipeline.remove_policy(&RemovePolicyOptions {
            name: Some("c".to_string()),
            phase: Some(PipelinePhase::Sign),
        });
        assert_eq!(names(&removed), vec!["b", "c", "d"]);
        assert_eq!(names(&pipeline.policies()), vec!["a"]);

        let after = pipeline.ordered_policies().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(names(&after), vec!["a"]);
    }

    #[test]
    fn test_remove_unphased() {
        let log = RecordingPolicy::shared_log();
        let mut pipeline = Pipeline::new();
        pipeline.add_policy(RecordingPolicy::new("a", log.clone()), PolicyOptions::default()).unwrap();
        pipeline
            .add_policy(RecordingPolicy::new("gated", log.clone()), PolicyOptions::after_phase(PipelinePhase::Retry))
            .unwrap();
        pipeline
            .add_policy(RecordingPolicy::new("sign", log), PolicyOptions::in_phase(PipelinePhase::Sign))
            .unwrap();

        let removed = pipeline.remove_policy(&RemovePolicyOptions::by_phase(PipelinePhase::Unphased));
        assert_eq!(names(&removed), vec!["a", "gated"]);
        assert!(pipeline.remove_policy(&RemovePolicyOptions::by_name("missing")).is_empty());
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_clone_has_fresh_cache() {
        let log = RecordingPolicy::shared_log();
        let pipeline = Pipeline::new()
            .with_policy(RecordingPolicy::new("a", log), PolicyOptions::default())
            .unwrap();
        let original = pipeline.ordered_policies().unwrap();

        let mut cloned = pipeline.clone();
        let cloned_order = cloned.ordered_policies().unwrap();
        assert!(!Arc::ptr_eq(&original, &cloned_order));
        assert!(Arc::ptr_eq(&original[0], &cloned_order[0]));

        cloned.remove_policy(&RemovePolicyOptions::by_name("a"));
        assert_eq!(pipeline.len(), 1);
        assert!(cloned.is_empty());
    }
}
