//! Chains and steps.

use serde::{Deserialize, Serialize};

use crate::{ChainId, ProofDefinition, StepId, StepIndex};

/// A step's position inside its chain.
///
/// `step_count` is stored on every step so "is this the last one" is O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainRef {
    pub chain_id: ChainId,
    pub step_index: StepIndex,
    pub step_count: u32,
}

impl ChainRef {
    #[must_use]
    pub const fn is_head(&self) -> bool {
        self.step_index.is_first()
    }

    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.step_index.value() == self.step_count
    }
}

/// Atomic unit of execution.
///
/// A step without `proof_of_work` is a content-only checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub label: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub chain_ref: ChainRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_work: Option<ProofDefinition>,
}

impl Step {
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        self.chain_ref.chain_id
    }

    #[must_use]
    pub const fn index(&self) -> StepIndex {
        self.chain_ref.step_index
    }

    /// Whether advancing past this step needs recorded evidence.
    #[must_use]
    pub fn requires_proof(&self) -> bool {
        self.proof_of_work.as_ref().is_some_and(|def| def.required)
    }

    /// `"k/n"` position string.
    #[must_use]
    pub fn position(&self) -> String {
        format!(
            "{}/{}",
            self.chain_ref.step_index, self.chain_ref.step_count
        )
    }
}

/// Whether `steps` form one chain with a dense 1..=n index sequence.
#[must_use]
pub fn is_dense_chain(steps: &[Step]) -> bool {
    let Some(first) = steps.first() else {
        return false;
    };
    let chain_id = first.chain_id();
    let count = steps.len() as u32;
    steps.iter().enumerate().all(|(pos, step)| {
        step.chain_id() == chain_id
            && step.index().value() == pos as u32 + 1
            && step.chain_ref.step_count == count
    })
}
