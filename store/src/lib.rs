//! Storage collaborators for the chain engine.
//!
//! The engine only talks to the two traits below. Each implementation must
//! provide per-key atomic writes; cross-key coordination (one state transition
//! per chain at a time) is the engine's job.
//!
//! ```text
//! StepStore   ── steps keyed by id, unique (chain_id, step_index)
//! ProofStore  ── one ProofResult per step id, one Attestation per chain
//! ChainStore  ── both, plus the one write that spans them
//! ```

mod memory;
mod sqlite;
mod sqlite_util;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use waypoint_types::{
    Attestation, ChainId, ProofHash, ProofResult, Step, StepId, StepIndex,
};

/// Chain/step persistence.
pub trait StepStore: Send + Sync {
    fn get_step_by_id(&self, id: StepId) -> Result<Option<Step>>;

    /// All steps of a chain, ordered by `step_index`. Empty if unknown.
    fn find_steps_by_chain(&self, chain_id: ChainId) -> Result<Vec<Step>>;

    fn upsert_steps(&self, steps: &[Step]) -> Result<()>;

    fn delete_chain(&self, chain_id: ChainId) -> Result<()>;

    /// Step at `(chain_id, index)`.
    fn get_step_at(&self, chain_id: ChainId, index: StepIndex) -> Result<Option<Step>> {
        Ok(self
            .find_steps_by_chain(chain_id)?
            .into_iter()
            .find(|step| step.index() == index))
    }
}

/// Proof result persistence. Exclusive owner of `ProofResult` lifetime.
pub trait ProofStore: Send + Sync {
    fn get_result(&self, step_id: StepId) -> Result<Option<ProofResult>>;

    /// Insert or overwrite the result for `step_id`.
    fn put_result(&self, step_id: StepId, result: &ProofResult) -> Result<()>;

    fn get_proof_hash(&self, step_id: StepId) -> Result<Option<ProofHash>> {
        Ok(self.get_result(step_id)?.map(|result| result.proof_hash))
    }

    /// Drop results for the given steps (chain deletion only).
    fn delete_results(&self, step_ids: &[StepId]) -> Result<()>;

    fn get_attestation(&self, chain_id: ChainId) -> Result<Option<Attestation>>;

    fn put_attestation(&self, attestation: &Attestation) -> Result<()>;

    fn delete_attestation(&self, chain_id: ChainId) -> Result<()>;
}

/// Step and proof storage behind one handle.
pub trait ChainStore: StepStore + ProofStore {
    /// Install `steps`, replacing every chain they belong to.
    ///
    /// The old steps of those chains, their proof results and attestations
    /// are dropped in the same write. Either all of it lands or none of it.
    fn replace_chains(&self, steps: &[Step]) -> Result<()>;
}

fn ensure_result_key(step_id: StepId, result: &ProofResult) -> Result<()> {
    anyhow::ensure!(
        result.step_id == step_id,
        "proof result for step {} cannot be stored under step {step_id}",
        result.step_id
    );
    Ok(())
}
