//! Out-of-band interactive confirmation.
//!
//! `user_confirmation` proofs are resolved here and nowhere else: the server
//! asks a human through the channel, the agent never supplies the answer.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

pub type ConfirmFut<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<ConfirmationOutcome>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Confirmed,
    Declined,
}

impl ConfirmationOutcome {
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Channel to a human who can confirm a step.
///
/// The engine bounds every request with its configured timeout and drops the
/// future when it expires, so implementations must be cancel-safe.
pub trait ConfirmationChannel: Send + Sync {
    fn request_confirmation<'a>(&'a self, prompt: &'a str) -> ConfirmFut<'a>;
}
