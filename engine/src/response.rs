//! Structured results returned to the transport layer.
//!
//! Every result carries an explicit `next_action` hint so an agent never has
//! to infer what the engine expects next. Solutions are never echoed back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use waypoint_types::{
    AttestOutcome, ChainId, Challenge, ProofDefinition, ProofHash, ProofStatus, Step, StepId,
    StepIndex,
};

/// Challenge as shown to an agent: parameters plus how to satisfy it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeView {
    pub required: bool,
    #[serde(flatten)]
    pub challenge: Challenge,
    pub instructions: String,
}

impl From<&ProofDefinition> for ChallengeView {
    fn from(definition: &ProofDefinition) -> Self {
        Self {
            required: definition.required,
            challenge: definition.challenge.clone(),
            instructions: definition.instructions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub step_id: StepId,
    pub chain_id: ChainId,
    pub label: String,
    pub content: String,
    pub tags: Vec<String>,
    /// `"k/n"`.
    pub position: String,
    pub step_index: StepIndex,
    pub step_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeView>,
}

impl From<&Step> for StepView {
    fn from(step: &Step) -> Self {
        Self {
            step_id: step.id,
            chain_id: step.chain_id(),
            label: step.label.clone(),
            content: step.content.clone(),
            tags: step.tags.clone(),
            position: step.position(),
            step_index: step.index(),
            step_count: step.chain_ref.step_count,
            challenge: step.proof_of_work.as_ref().map(ChallengeView::from),
        }
    }
}

impl StepView {
    /// What the agent should do with this step.
    #[must_use]
    pub fn next_action(&self) -> String {
        match &self.challenge {
            Some(challenge) => format!(
                "Perform step {} \"{}\". {}. Then call next with step_id {} and the solution.",
                self.position, self.label, challenge.instructions, self.step_id
            ),
            None => format!(
                "Read step {} \"{}\", then call next with step_id {} (no proof needed).",
                self.position, self.label, self.step_id
            ),
        }
    }
}

/// Chain created or replaced by `mint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintedChain {
    pub chain_id: ChainId,
    pub label: String,
    pub step_count: u32,
    /// An existing chain with this identity was deleted first.
    pub replaced: bool,
    pub head: StepView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BeginOutcome {
    /// Binding: proceed with `step`.
    Commit { step: StepView, next_action: String },
    /// Non-binding: the closest chain, which may not fit the request.
    BestEffort {
        step: StepView,
        score: f32,
        next_action: String,
    },
    /// Several chains match equally well; the caller must choose.
    Choose {
        options: Vec<StepView>,
        next_action: String,
    },
    NoMatch { next_action: String },
}

impl BeginOutcome {
    pub(crate) fn commit(step: &Step) -> Self {
        let step = StepView::from(step);
        let next_action = step.next_action();
        Self::Commit { step, next_action }
    }

    pub(crate) fn best_effort(step: &Step, score: f32) -> Self {
        let step = StepView::from(step);
        let next_action = format!(
            "Closest chain \"{}\" scored {score:.2} and is not a confirmed match. \
             Verify it fits the task before following it. {}",
            step.label,
            step.next_action()
        );
        Self::BestEffort {
            step,
            score,
            next_action,
        }
    }

    pub(crate) fn choose(options: &[Step]) -> Self {
        let options: Vec<StepView> = options.iter().map(StepView::from).collect();
        let next_action = format!(
            "{} chains match equally. Do not proceed automatically: pick one and call begin \
             with its chain_id.",
            options.len()
        );
        Self::Choose {
            options,
            next_action,
        }
    }

    pub(crate) fn no_match() -> Self {
        Self::NoMatch {
            next_action: "No existing chain applies. Consider minting a new chain for this task."
                .to_owned(),
        }
    }

    #[must_use]
    pub fn next_action(&self) -> &str {
        match self {
            Self::Commit { next_action, .. }
            | Self::BestEffort { next_action, .. }
            | Self::Choose { next_action, .. }
            | Self::NoMatch { next_action } => next_action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedTo {
    Current,
    /// Reinterpreted as late evidence for the preceding step.
    Previous,
}

/// Proof written by a `next` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedProof {
    pub step_id: StepId,
    pub step_index: StepIndex,
    pub status: ProofStatus,
    pub proof_hash: ProofHash,
    pub evidence_summary: String,
    pub applied_to: AppliedTo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Progress {
    Advanced { step: StepView },
    Completed { chain_id: ChainId, last_step_id: StepId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded: Option<RecordedProof>,
    pub progress: Progress,
    pub next_action: String,
}

impl NextOutcome {
    pub(crate) fn advanced(recorded: Option<RecordedProof>, step: &Step) -> Self {
        let step = StepView::from(step);
        let next_action = step.next_action();
        Self {
            recorded,
            progress: Progress::Advanced { step },
            next_action,
        }
    }

    pub(crate) fn completed(recorded: Option<RecordedProof>, last: &Step) -> Self {
        Self {
            recorded,
            progress: Progress::Completed {
                chain_id: last.chain_id(),
                last_step_id: last.id,
            },
            next_action: format!(
                "Chain complete. Call attest with step_id {} and an outcome to record the result.",
                last.id
            ),
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.progress, Progress::Completed { .. })
    }

    #[must_use]
    pub fn current_step(&self) -> Option<&StepView> {
        match &self.progress {
            Progress::Advanced { step } => Some(step),
            Progress::Completed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestReceipt {
    pub chain_id: ChainId,
    pub step_id: StepId,
    pub outcome: AttestOutcome,
    pub recorded_at: DateTime<Utc>,
    /// Required steps still lacking a successful proof. Informational only.
    pub unverified_steps: Vec<StepIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainState {
    NotStarted,
    /// `step_index` is the first step blocking progression.
    AwaitingProof { step_index: StepIndex },
    Completed,
    Attested { outcome: AttestOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub step_id: StepId,
    pub step_index: StepIndex,
    pub label: String,
    pub requires_proof: bool,
    pub proof: Option<ProofStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    pub chain_id: ChainId,
    pub label: String,
    pub state: ChainState,
    pub steps: Vec<StepStatus>,
}
