//! Proof hash chain.
//!
//! `proof_hash = SHA-256(step_id ‖ canonical(evidence) ‖ previous_hash)`.
//! `previous_hash` is the hash of the nearest preceding step with a recorded
//! result, or [`ProofHash::GENESIS`]. Content-only steps never record a
//! result, so they are transparent to the chain.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use waypoint_types::{ChainId, ProofHash, ProofResult, Step, StepId, StepIndex};

/// Compute one link of the hash chain.
#[must_use]
pub fn compute_proof_hash(step_id: StepId, evidence: &Value, previous: ProofHash) -> ProofHash {
    let mut hasher = Sha256::new();
    hasher.update(step_id.as_uuid().as_bytes());
    hasher.update(canonical_json(evidence).as_bytes());
    hasher.update(previous.as_bytes());
    ProofHash::from_bytes(hasher.finalize().into())
}

/// JSON with object keys sorted at every depth and no insignificant whitespace.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (pos, (key, item)) in entries.into_iter().enumerate() {
                if pos > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (pos, item) in items.iter().enumerate() {
                if pos > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hash the step at `before` links to.
///
/// `results` holds the chain's results in index order.
#[must_use]
pub fn preceding_hash(results: &[Option<ProofResult>], before: StepIndex) -> ProofHash {
    let end = (before.value() as usize).saturating_sub(1).min(results.len());
    results[..end]
        .iter()
        .rev()
        .find_map(|result| result.as_ref().map(|r| r.proof_hash))
        .unwrap_or(ProofHash::GENESIS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditVerdict {
    /// Recorded hash matches its evidence and links to its predecessor.
    Verified,
    /// No proof recorded for this step.
    Unrecorded,
    /// Stored evidence no longer hashes to the stored proof hash.
    HashMismatch,
    /// The stored previous hash is not the predecessor's current proof hash.
    BrokenLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepAudit {
    pub step_id: StepId,
    pub step_index: StepIndex,
    pub verdict: AuditVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainAudit {
    pub chain_id: ChainId,
    pub steps: Vec<StepAudit>,
}

impl ChainAudit {
    /// No step shows evidence tampering or a broken link.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.steps.iter().all(|step| {
            !matches!(
                step.verdict,
                AuditVerdict::HashMismatch | AuditVerdict::BrokenLink
            )
        })
    }

    /// First step whose verdict breaks the chain, if any.
    #[must_use]
    pub fn first_break(&self) -> Option<&StepAudit> {
        self.steps.iter().find(|step| {
            matches!(
                step.verdict,
                AuditVerdict::HashMismatch | AuditVerdict::BrokenLink
            )
        })
    }
}

/// Recompute every recorded link of a chain.
///
/// `results` is parallel to `steps`.
#[must_use]
pub fn audit_chain(chain_id: ChainId, steps: &[Step], results: &[Option<ProofResult>]) -> ChainAudit {
    let mut expected_previous = ProofHash::GENESIS;
    let mut audits = Vec::with_capacity(steps.len());

    for (step, result) in steps.iter().zip(results) {
        let verdict = match result {
            None => AuditVerdict::Unrecorded,
            Some(result) => {
                let recomputed =
                    compute_proof_hash(step.id, &result.evidence, result.previous_hash);
                let verdict = if recomputed != result.proof_hash {
                    AuditVerdict::HashMismatch
                } else if result.previous_hash != expected_previous {
                    AuditVerdict::BrokenLink
                } else {
                    AuditVerdict::Verified
                };
                expected_previous = result.proof_hash;
                verdict
            }
        };
        audits.push(StepAudit {
            step_id: step.id,
            step_index: step.index(),
            verdict,
        });
    }

    ChainAudit {
        chain_id,
        steps: audits,
    }
}
