//! In-process store backed by hash maps.
//!
//! Suitable for tests and for embedding the engine without a database. Every
//! method takes one lock, so each call is atomic per key. `replace_chains`
//! takes all three, always in field order.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{Result, anyhow};
use waypoint_types::{Attestation, ChainId, ProofResult, Step, StepId};

use crate::{ChainStore, ProofStore, StepStore, ensure_result_key};

#[derive(Debug, Default)]
pub struct MemoryStore {
    steps: RwLock<HashMap<StepId, Step>>,
    results: RwLock<HashMap<StepId, ProofResult>>,
    attestations: RwLock<HashMap<ChainId, Attestation>>,
}

fn poisoned() -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored result without going through the engine.
    ///
    /// Only useful for simulating out-of-band tampering in audits.
    pub fn overwrite_result_unchecked(&self, result: ProofResult) -> Result<()> {
        self.results
            .write()
            .map_err(|_| poisoned())?
            .insert(result.step_id, result);
        Ok(())
    }
}

impl StepStore for MemoryStore {
    fn get_step_by_id(&self, id: StepId) -> Result<Option<Step>> {
        Ok(self.steps.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    fn find_steps_by_chain(&self, chain_id: ChainId) -> Result<Vec<Step>> {
        let steps = self.steps.read().map_err(|_| poisoned())?;
        let mut found: Vec<Step> = steps
            .values()
            .filter(|step| step.chain_id() == chain_id)
            .cloned()
            .collect();
        found.sort_by_key(Step::index);
        Ok(found)
    }

    fn upsert_steps(&self, steps: &[Step]) -> Result<()> {
        let mut stored = self.steps.write().map_err(|_| poisoned())?;
        for step in steps {
            stored.insert(step.id, step.clone());
        }
        Ok(())
    }

    fn delete_chain(&self, chain_id: ChainId) -> Result<()> {
        self.steps
            .write()
            .map_err(|_| poisoned())?
            .retain(|_, step| step.chain_id() != chain_id);
        Ok(())
    }
}

impl ProofStore for MemoryStore {
    fn get_result(&self, step_id: StepId) -> Result<Option<ProofResult>> {
        Ok(self
            .results
            .read()
            .map_err(|_| poisoned())?
            .get(&step_id)
            .cloned())
    }

    fn put_result(&self, step_id: StepId, result: &ProofResult) -> Result<()> {
        ensure_result_key(step_id, result)?;
        self.results
            .write()
            .map_err(|_| poisoned())?
            .insert(step_id, result.clone());
        Ok(())
    }

    fn delete_results(&self, step_ids: &[StepId]) -> Result<()> {
        let mut results = self.results.write().map_err(|_| poisoned())?;
        for id in step_ids {
            results.remove(id);
        }
        Ok(())
    }

    fn get_attestation(&self, chain_id: ChainId) -> Result<Option<Attestation>> {
        Ok(self
            .attestations
            .read()
            .map_err(|_| poisoned())?
            .get(&chain_id)
            .cloned())
    }

    fn put_attestation(&self, attestation: &Attestation) -> Result<()> {
        self.attestations
            .write()
            .map_err(|_| poisoned())?
            .insert(attestation.chain_id, attestation.clone());
        Ok(())
    }

    fn delete_attestation(&self, chain_id: ChainId) -> Result<()> {
        self.attestations
            .write()
            .map_err(|_| poisoned())?
            .remove(&chain_id);
        Ok(())
    }
}

impl ChainStore for MemoryStore {
    fn replace_chains(&self, steps: &[Step]) -> Result<()> {
        let mut stored = self.steps.write().map_err(|_| poisoned())?;
        let mut results = self.results.write().map_err(|_| poisoned())?;
        let mut attestations = self.attestations.write().map_err(|_| poisoned())?;

        let replaced: HashSet<ChainId> = steps.iter().map(Step::chain_id).collect();
        stored.retain(|id, step| {
            let keep = !replaced.contains(&step.chain_id());
            if !keep {
                results.remove(id);
            }
            keep
        });
        attestations.retain(|chain_id, _| !replaced.contains(chain_id));
        for step in steps {
            stored.insert(step.id, step.clone());
        }
        Ok(())
    }
}
