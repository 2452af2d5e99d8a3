//! Step Navigator and solution routing.
//!
//! Steps are addressed by `(chain_id, step_index)`; neighbours are the
//! indices one below and one above. Lookups only, no mutation.

use anyhow::Result;
use waypoint_store::StepStore;
use waypoint_types::{ChainId, ErrorCode, ProofResult, Rejection, Step, StepIndex};

pub struct StepNavigator<'a> {
    steps: &'a dyn StepStore,
}

impl<'a> StepNavigator<'a> {
    #[must_use]
    pub fn new(steps: &'a dyn StepStore) -> Self {
        Self { steps }
    }

    /// The step before `step`; `None` for a chain head.
    pub fn previous(&self, step: &Step) -> Result<Option<Step>> {
        match step.index().previous() {
            Some(index) => self.steps.get_step_at(step.chain_id(), index),
            None => Ok(None),
        }
    }

    /// The step after `step`; `None` past the last index.
    pub fn next(&self, step: &Step) -> Result<Option<Step>> {
        if step.chain_ref.is_last() {
            return Ok(None);
        }
        match step.index().next() {
            Some(index) => self.steps.get_step_at(step.chain_id(), index),
            None => Ok(None),
        }
    }

    pub fn head(&self, chain_id: ChainId) -> Result<Option<Step>> {
        self.steps.get_step_at(chain_id, StepIndex::FIRST)
    }

    pub fn last(&self, chain_id: ChainId) -> Result<Option<Step>> {
        Ok(self.steps.find_steps_by_chain(chain_id)?.pop())
    }

    /// Head of the chain `step` belongs to (the step itself when it is one).
    pub fn head_of(&self, step: &Step) -> Result<Option<Step>> {
        if step.chain_ref.is_head() {
            return Ok(Some(step.clone()));
        }
        self.head(step.chain_id())
    }
}

/// Where a submitted solution applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Evaluate against the requested step's own challenge (if any).
    AppliedToCurrent,
    /// The requested step is content-only and its predecessor is still
    /// unverified: the solution is evidence for the predecessor.
    AppliedToPrevious,
    Blocked(Rejection),
}

/// A step earlier in the chain together with its recorded proof.
#[derive(Debug, Clone, Copy)]
pub struct Predecessor<'a> {
    pub step: &'a Step,
    pub result: Option<&'a ProofResult>,
}

impl Predecessor<'_> {
    fn is_unverified(&self) -> bool {
        self.step.proof_of_work.is_some()
            && !self.result.is_some_and(|result| result.status.is_success())
    }

    /// Why this step keeps later steps from advancing, if it does.
    fn gate(&self) -> Option<Rejection> {
        match self.result {
            Some(result) if !result.status.is_success() => Some(command_failed(self.step, result)),
            None if self.step.requires_proof() => Some(missing_proof(self.step)),
            _ => None,
        }
    }
}

/// First earlier step, in chain order, that blocks whatever follows it.
fn first_gate(earlier: &[Predecessor<'_>]) -> Option<Rejection> {
    earlier.iter().find_map(Predecessor::gate)
}

/// Decide where a `next` call's solution goes.
///
/// `earlier` holds every step before `current`, in chain order. Reinterpretation
/// is checked first: a late solution for the predecessor arriving at a
/// content-only step is routed back rather than rejected. Either way the
/// target step may only be proven once every step before it is settled.
#[must_use]
pub fn route(current: &Step, earlier: &[Predecessor<'_>], has_solution: bool) -> Routing {
    if let Some((previous, before)) = earlier.split_last()
        && current.proof_of_work.is_none()
        && has_solution
        && previous.is_unverified()
    {
        return match first_gate(before) {
            Some(rejection) => Routing::Blocked(rejection),
            None => Routing::AppliedToPrevious,
        };
    }

    match first_gate(earlier) {
        Some(rejection) => Routing::Blocked(rejection),
        None => Routing::AppliedToCurrent,
    }
}

pub(crate) fn missing_proof(step: &Step) -> Rejection {
    let instructions = step
        .proof_of_work
        .as_ref()
        .map(waypoint_types::ProofDefinition::instructions)
        .unwrap_or_default();
    Rejection::new(
        ErrorCode::MissingProof,
        format!(
            "step {} \"{}\" requires proof before the chain can advance",
            step.position(),
            step.label
        ),
    )
    .with_remediation(format!(
        "{instructions}, then call next on step {}",
        step.id
    ))
}

fn command_failed(step: &Step, result: &ProofResult) -> Rejection {
    Rejection::new(
        ErrorCode::CommandFailed,
        format!(
            "proof for step {} \"{}\" was recorded as a failure ({})",
            step.position(),
            step.label,
            result.evidence_summary
        ),
    )
    .with_remediation(format!(
        "fix the problem and resubmit proof for step {}",
        step.id
    ))
}
