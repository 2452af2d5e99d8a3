//! Structured, machine-parseable request rejections.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable rejection codes. Serialized as SCREAMING_SNAKE_CASE strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Build-time identity collision without `force`.
    DuplicateChain,
    /// Advancing past a step whose required proof is absent.
    MissingProof,
    /// The blocking step's shell proof was recorded as a failure.
    CommandFailed,
    /// Non-shell evidence was evaluated and did not satisfy the challenge.
    VerificationFailed,
    /// Solution kind differs from the declared challenge kind.
    TypeMismatch,
    /// Interactive confirmation is required but no channel is available.
    CapabilityRequired,
    /// The confirmation channel did not answer in time.
    ConfirmationTimeout,
    /// Unknown step or chain reference.
    NotFound,
    /// The document could not be turned into a chain.
    InvalidDocument,
    /// A request argument is malformed.
    InvalidRequest,
    /// A storage collaborator failed.
    StorageError,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateChain => "DUPLICATE_CHAIN",
            Self::MissingProof => "MISSING_PROOF",
            Self::CommandFailed => "COMMAND_FAILED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::CapabilityRequired => "CAPABILITY_REQUIRED",
            Self::ConfirmationTimeout => "CONFIRMATION_TIMEOUT",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidDocument => "INVALID_DOCUMENT",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::StorageError => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-request rejection: code, human-readable message, and for blocking
/// conditions the concrete next action.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Rejection {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            remediation: None,
        }
    }

    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    #[must_use]
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{what} not found"))
    }

    /// Wrap a collaborator failure, keeping the full error chain in the message.
    #[must_use]
    pub fn storage(err: &anyhow::Error) -> Self {
        Self::new(ErrorCode::StorageError, format!("{err:#}"))
            .with_remediation("retry the request; the store rejected the operation")
    }
}
