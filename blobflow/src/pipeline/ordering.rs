//! Resolves the execution order of registered policies.
//!
//! Policies are grouped by phase and walked in the global phase order. A
//! policy is emitted once every policy it depends on has been emitted and, if
//! it is gated with `after_phase`, once that phase has run and drained.
//! Unphased policies are walked again whenever a phase stalls or has gated
//! policies waiting on it. The walk repeats until every policy is placed or an
//! iteration makes no progress.

use super::{PipelinePhase, PipelinePolicy, PolicyOptions};
use crate::errors::PolicyOrderingError;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct PolicyNode {
    depends_on: BTreeSet<usize>,
    dependants: BTreeSet<usize>,
    after_phase: Option<PipelinePhase>,
}

#[derive(Debug, Default)]
struct PhaseState {
    members: Vec<usize>,
    has_run: bool,
    has_after_policies: bool,
}

struct Ordering {
    nodes: Vec<PolicyNode>,
    phases: [PhaseState; 5],
    result: Vec<usize>,
}

impl Ordering {
    fn phase(&mut self, phase: PipelinePhase) -> &mut PhaseState {
        &mut self.phases[phase.index()]
    }

    fn gate_open(&self, node: usize) -> bool {
        match self.nodes[node].after_phase {
            Some(gate) => {
                let gate = &self.phases[gate.index()];
                gate.has_run && gate.members.is_empty()
            }
            None => true,
        }
    }

    fn walk_phase(&mut self, phase: PipelinePhase) {
        self.phase(phase).has_run = true;
        let members = self.phase(phase).members.clone();

        for node in members {
            if !self.gate_open(node) || !self.nodes[node].depends_on.is_empty() {
                continue;
            }

            self.result.push(node);
            for dependant in std::mem::take(&mut self.nodes[node].dependants) {
                self.nodes[dependant].depends_on.remove(&node);
            }
            self.phase(phase).members.retain(|&m| m != node);
        }
    }

    fn walk_phases(&mut self) {
        for phase in PipelinePhase::ORDER {
            self.walk_phase(phase);

            let stalled = !self.phase(phase).members.is_empty();
            if stalled && phase != PipelinePhase::Unphased {
                if !self.phase(PipelinePhase::Unphased).has_run {
                    self.walk_phase(PipelinePhase::Unphased);
                }
                return;
            }

            if self.phase(phase).has_after_policies {
                self.walk_phase(PipelinePhase::Unphased);
            }
        }
    }
}

/// Orders `entries`, returning the policies outermost first.
pub(crate) fn order_policies(
    entries: &[(Arc<dyn PipelinePolicy>, PolicyOptions)],
) -> Result<Vec<Arc<dyn PipelinePolicy>>, PolicyOrderingError> {
    let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    for (index, (policy, options)) in entries.iter().enumerate() {
        options.validate(policy.name())?;
        if by_name.insert(policy.name(), index).is_some() {
            return Err(PolicyOrderingError::DuplicatePolicyName(policy.name().to_string()));
        }
    }

    let mut ordering = Ordering {
        nodes: entries.iter().map(|_| PolicyNode::default()).collect(),
        phases: Default::default(),
        result: Vec::with_capacity(entries.len()),
    };

    for (index, (_, options)) in entries.iter().enumerate() {
        ordering.phase(options.effective_phase()).members.push(index);
        if let Some(gate) = options.after_phase {
            ordering.phase(gate).has_after_policies = true;
            ordering.nodes[index].after_phase = Some(gate);
        }
    }

    // Names that are not registered are ignored.
    for (index, (_, options)) in entries.iter().enumerate() {
        for name in &options.after_policies {
            if let Some(&dependency) = by_name.get(name.as_str()) {
                ordering.nodes[index].depends_on.insert(dependency);
                ordering.nodes[dependency].dependants.insert(index);
            }
        }
        for name in &options.before_policies {
            if let Some(&dependant) = by_name.get(name.as_str()) {
                ordering.nodes[dependant].depends_on.insert(index);
                ordering.nodes[index].dependants.insert(dependant);
            }
        }
    }

    let mut iteration = 0_usize;
    while ordering.result.len() < entries.len() {
        iteration += 1;
        let placed = ordering.result.len();
        ordering.walk_phases();

        trace!(
            iteration,
            placed = ordering.result.len(),
            total = entries.len(),
            "Ordering pass finished"
        );

        if ordering.result.len() <= placed && iteration > 1 {
            let emitted: BTreeSet<usize> = ordering.result.iter().copied().collect();
            let remaining = entries
                .iter()
                .enumerate()
                .filter(|(index, _)| !emitted.contains(index))
                .map(|(_, (policy, _))| policy.name().to_string())
                .collect();
            return Err(PolicyOrderingError::UnsatisfiableDependencies { remaining });
        }
    }

    Ok(ordering
        .result
        .into_iter()
        .map(|index| entries[index].0.clone())
        .collect())
}
