//! Proof-of-work vocabulary: what a step demands, what an agent submits, and
//! what the proof store keeps.
//!
//! `Challenge` and `Solution` are closed sum types over the same four kinds so
//! that verification is an exhaustive match, never a bag of optional fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::{ChainId, NonEmptyString, StepId};

// ── Kinds ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Shell,
    McpTool,
    UserConfirmation,
    Comment,
}

impl ChallengeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::McpTool => "mcp_tool",
            Self::UserConfirmation => "user_confirmation",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Definitions ──────────────────────────────────────────────

/// Type-specific parameters of a proof requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Challenge {
    /// The agent runs `command` itself and reports the exit code.
    Shell { command: String, timeout_secs: u64 },
    /// The agent calls `tool` and reports its result.
    McpTool { tool: String },
    /// Resolved only through the server's interactive confirmation channel.
    UserConfirmation { prompt: String },
    /// Free text of at least `min_length` characters.
    Comment { min_length: usize },
}

impl Challenge {
    #[must_use]
    pub const fn kind(&self) -> ChallengeKind {
        match self {
            Self::Shell { .. } => ChallengeKind::Shell,
            Self::McpTool { .. } => ChallengeKind::McpTool,
            Self::UserConfirmation { .. } => ChallengeKind::UserConfirmation,
            Self::Comment { .. } => ChallengeKind::Comment,
        }
    }
}

/// Proof requirement attached to a step at build time. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofDefinition {
    pub required: bool,
    #[serde(flatten)]
    pub challenge: Challenge,
}

impl ProofDefinition {
    #[must_use]
    pub const fn required(challenge: Challenge) -> Self {
        Self {
            required: true,
            challenge,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ChallengeKind {
        self.challenge.kind()
    }

    /// Agent-facing instruction for satisfying this requirement.
    #[must_use]
    pub fn instructions(&self) -> String {
        match &self.challenge {
            Challenge::Shell {
                command,
                timeout_secs,
            } => format!(
                "Run `{command}` (timeout {timeout_secs}s) and submit \
                 {{\"type\":\"shell\",\"exit_code\":<exit code>,\"output\":<optional output>}}"
            ),
            Challenge::McpTool { tool } => format!(
                "Call the `{tool}` tool and submit \
                 {{\"type\":\"mcp_tool\",\"tool\":\"{tool}\",\"result\":<tool result>,\"success\":<bool>}}"
            ),
            Challenge::UserConfirmation { prompt } => format!(
                "The user must confirm: \"{prompt}\". The server collects this confirmation; \
                 submit {{\"type\":\"user_confirmation\"}} to request it"
            ),
            Challenge::Comment { min_length } => format!(
                "Submit {{\"type\":\"comment\",\"text\":<what you did>}} with at least \
                 {min_length} characters"
            ),
        }
    }
}

// ── Solutions ────────────────────────────────────────────────

/// Evidence submitted by an agent for a step's challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Solution {
    Shell {
        exit_code: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    McpTool {
        tool: String,
        #[serde(default)]
        result: Value,
        success: bool,
    },
    /// Carries nothing: an agent cannot author a confirmation, only ask for one.
    UserConfirmation,
    Comment {
        text: String,
    },
}

impl Solution {
    #[must_use]
    pub const fn kind(&self) -> ChallengeKind {
        match self {
            Self::Shell { .. } => ChallengeKind::Shell,
            Self::McpTool { .. } => ChallengeKind::McpTool,
            Self::UserConfirmation => ChallengeKind::UserConfirmation,
            Self::Comment { .. } => ChallengeKind::Comment,
        }
    }
}

// ── Hashes ───────────────────────────────────────────────────

/// SHA-256 link in a chain's proof hash chain.
///
/// Serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProofHash([u8; 32]);

impl ProofHash {
    /// Seed used as the "previous hash" of a chain's first recorded proof.
    pub const GENESIS: Self = Self([0u8; 32]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("proof hash must be 64 hex characters")]
pub struct ProofHashParseError;

impl FromStr for ProofHash {
    type Err = ProofHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 64 || !s.is_ascii() {
            return Err(ProofHashParseError);
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| ProofHashParseError)?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ProofHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ProofHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProofHash({})", self.to_hex())
    }
}

impl Serialize for ProofHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ProofHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Recorded state ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Success,
    Failure,
}

impl ProofStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl FromStr for ProofStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(format!("unknown proof status {other:?}")),
        }
    }
}

/// Outcome of verifying one step. At most one per step; resubmission overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofResult {
    pub step_id: StepId,
    pub status: ProofStatus,
    pub proof_hash: ProofHash,
    /// Link this hash was computed against (genesis or the preceding proof).
    pub previous_hash: ProofHash,
    pub recorded_at: DateTime<Utc>,
    pub evidence_summary: String,
    /// Canonical evidence the hash covers, kept so the chain can be audited.
    pub evidence: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestOutcome {
    Success,
    Partial,
    Failure,
}

impl AttestOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failure => "failure",
        }
    }
}

impl FromStr for AttestOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failure" => Ok(Self::Failure),
            other => Err(format!("unknown attest outcome {other:?}")),
        }
    }
}

/// Summary judgment recorded against a chain's last step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub chain_id: ChainId,
    pub step_id: StepId,
    pub outcome: AttestOutcome,
    pub message: NonEmptyString,
    pub recorded_at: DateTime<Utc>,
}
