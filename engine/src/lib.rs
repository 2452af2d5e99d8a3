//! Protocol chain engine.
//!
//! Turns procedure documents into ordered, identity-stable chains of steps and
//! enforces that an agent advances through them in order with verifiable,
//! hash-chained proof of each step.
//!
//! ```text
//! builder ──▶ StepStore ◀── navigator ◀── resolver
//!                 ▲              ▲
//!                 │              │
//!             progression (Engine) ──▶ verifier ──▶ hash_chain ──▶ ProofStore
//! ```

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Every public fallible op returns a structured Rejection
#![allow(clippy::missing_panics_doc)] // Panics only in tests

pub mod builder;
mod confirmation;
pub mod hash_chain;
mod locks;
pub mod navigator;
mod progression;
mod ranking;
pub mod resolver;
mod response;
mod settings;
pub mod verifier;

pub use builder::{BuildError, BuiltChain, ChainBuilder, normalize_label};
pub use confirmation::{ConfirmFut, ConfirmationChannel, ConfirmationOutcome};
pub use hash_chain::{AuditVerdict, ChainAudit, StepAudit};
pub use locks::{ChainGuard, ChainLocks};
pub use progression::{BeginTarget, Engine};
pub use ranking::{Candidate, RankFut, Ranker};
pub use resolver::{ChainResolver, Resolution};
pub use response::{
    AppliedTo, AttestReceipt, BeginOutcome, ChainState, ChainStatus, ChallengeView, MintedChain,
    NextOutcome, Progress, RecordedProof, StepStatus, StepView,
};
pub use settings::{BuilderSettings, EngineSettings};

pub use waypoint_types::{
    AttestOutcome, ChainId, Challenge, ChallengeKind, ErrorCode, ProofDefinition, ProofHash,
    ProofStatus, Rejection, Solution, Step, StepId, StepIndex, is_dense_chain,
};
