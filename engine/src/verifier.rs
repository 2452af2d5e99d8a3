//! Proof Verifier.
//!
//! Evaluates a submitted solution against a step's challenge and seals the
//! outcome into a hash-chained `ProofResult`. The verifier judges reports; it
//! never runs commands or tools itself.

use chrono::Utc;
use serde_json::{Value, json};
use waypoint_types::{
    Challenge, ErrorCode, ProofDefinition, ProofHash, ProofResult, ProofStatus, Rejection,
    Solution, StepId,
};

use crate::confirmation::ConfirmationOutcome;
use crate::hash_chain::compute_proof_hash;

/// Evaluated evidence, not yet linked into the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub status: ProofStatus,
    /// Canonical evidence the proof hash will cover.
    pub evidence: Value,
    pub summary: String,
}

impl Verification {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.status.is_success()
    }

    /// Link into the chain after `previous`.
    #[must_use]
    pub fn seal(self, step_id: StepId, previous: ProofHash) -> ProofResult {
        ProofResult {
            step_id,
            status: self.status,
            proof_hash: compute_proof_hash(step_id, &self.evidence, previous),
            previous_hash: previous,
            recorded_at: Utc::now(),
            evidence_summary: self.summary,
            evidence: self.evidence,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    summary_chars: usize,
}

impl Verifier {
    #[must_use]
    pub const fn new(summary_chars: usize) -> Self {
        Self { summary_chars }
    }

    /// Judge an agent-authored solution.
    ///
    /// A kind mismatch is `TYPE_MISMATCH`. `user_confirmation` challenges are
    /// never satisfiable here and fail closed with `CAPABILITY_REQUIRED`.
    pub fn evaluate(
        &self,
        definition: &ProofDefinition,
        solution: &Solution,
    ) -> Result<Verification, Rejection> {
        if definition.kind() != solution.kind() {
            return Err(Rejection::new(
                ErrorCode::TypeMismatch,
                format!(
                    "step expects a {} proof but a {} solution was submitted",
                    definition.kind(),
                    solution.kind()
                ),
            )
            .with_remediation(definition.instructions()));
        }

        let (status, evidence, summary) = match (&definition.challenge, solution) {
            (
                Challenge::Shell { command, .. },
                Solution::Shell {
                    exit_code,
                    output,
                    duration_ms,
                },
            ) => {
                let mut summary = format!("exit {exit_code}");
                if let Some(ms) = duration_ms {
                    summary.push_str(&format!(" in {ms}ms"));
                }
                if let Some(line) = output
                    .as_deref()
                    .and_then(|out| out.lines().find(|l| !l.trim().is_empty()))
                {
                    summary.push_str(": ");
                    summary.push_str(line.trim());
                }
                (
                    status_of(*exit_code == 0),
                    json!({
                        "type": "shell",
                        "command": command,
                        "exit_code": exit_code,
                        "output": output,
                        "duration_ms": duration_ms,
                    }),
                    summary,
                )
            }
            (
                Challenge::McpTool { tool: expected },
                Solution::McpTool {
                    tool,
                    result,
                    success,
                },
            ) => {
                let matches = tool == expected;
                let summary = if matches {
                    format!("{tool} success={success}")
                } else {
                    format!("{tool} called, {expected} expected")
                };
                (
                    status_of(matches && *success),
                    json!({
                        "type": "mcp_tool",
                        "tool": tool,
                        "result": result,
                        "success": success,
                    }),
                    summary,
                )
            }
            (Challenge::Comment { min_length }, Solution::Comment { text }) => {
                let text = text.trim();
                let length = text.chars().count();
                (
                    status_of(length >= *min_length),
                    json!({"type": "comment", "text": text}),
                    text.to_owned(),
                )
            }
            (Challenge::UserConfirmation { .. }, _) => {
                return Err(confirmation_channel_required());
            }
            _ => {
                return Err(Rejection::new(
                    ErrorCode::TypeMismatch,
                    "solution does not match the challenge",
                ));
            }
        };

        Ok(Verification {
            status,
            evidence,
            summary: self.truncate(&summary),
        })
    }

    /// Judge the answer the confirmation channel returned.
    #[must_use]
    pub fn evaluate_confirmation(&self, prompt: &str, outcome: ConfirmationOutcome) -> Verification {
        let summary = match outcome {
            ConfirmationOutcome::Confirmed => "confirmed by user",
            ConfirmationOutcome::Declined => "declined by user",
        };
        Verification {
            status: status_of(outcome.is_confirmed()),
            evidence: json!({
                "type": "user_confirmation",
                "prompt": prompt,
                "outcome": outcome,
            }),
            summary: self.truncate(summary),
        }
    }

    fn truncate(&self, summary: &str) -> String {
        let line = summary.lines().next().unwrap_or_default().trim();
        if line.chars().count() <= self.summary_chars {
            return line.to_owned();
        }
        let mut cut: String = line.chars().take(self.summary_chars.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

const fn status_of(success: bool) -> ProofStatus {
    if success {
        ProofStatus::Success
    } else {
        ProofStatus::Failure
    }
}

pub(crate) fn confirmation_channel_required() -> Rejection {
    Rejection::new(
        ErrorCode::CapabilityRequired,
        "this step needs an interactive user confirmation and no confirmation channel is available",
    )
    .with_remediation("ask the user to complete this step through a client that supports confirmation")
}
