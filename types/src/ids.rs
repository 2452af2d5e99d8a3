use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Namespace for all UUIDv5 identifiers minted by waypoint.
const WAYPOINT_NAMESPACE: Uuid = Uuid::from_u128(0x6a1d_4c2e_93b7_5f08_a2e4_7c19_d03b_8e51);

/// Stable identity of a chain.
///
/// Derived from the chain's label, so re-submitting a document with the same
/// title maps onto the same chain instead of minting a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(Uuid);

impl ChainId {
    /// Identity for a chain label. Case and whitespace runs do not matter.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let key = identity_key(label);
        Self(Uuid::new_v5(&WAYPOINT_NAMESPACE, key.as_bytes()))
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| IdParseError { value: s.to_owned() })
    }
}

/// Identity of a single step.
///
/// Derived from the owning chain and the step's position, so rebuilding a
/// byte-identical document reproduces the same step ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(Uuid);

impl StepId {
    #[must_use]
    pub fn derive(chain_id: ChainId, index: StepIndex) -> Self {
        let mut name = Vec::with_capacity(20);
        name.extend_from_slice(chain_id.as_uuid().as_bytes());
        name.extend_from_slice(&index.value().to_be_bytes());
        Self(Uuid::new_v5(&WAYPOINT_NAMESPACE, &name))
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StepId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| IdParseError { value: s.to_owned() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid identifier: {value:?}")]
pub struct IdParseError {
    pub value: String,
}

/// 1-based position of a step inside its chain.
///
/// Zero is structurally unrepresentable via `NonZeroU32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepIndex(NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("step index must be a non-zero 32-bit integer")]
pub struct StepIndexError;

impl StepIndex {
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    pub fn try_new(value: u32) -> Result<Self, StepIndexError> {
        NonZeroU32::new(value).map(Self).ok_or(StepIndexError)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0.get()
    }

    #[must_use]
    pub const fn is_first(self) -> bool {
        self.0.get() == 1
    }

    /// The index before this one, `None` for the head.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        NonZeroU32::new(self.0.get() - 1).map(Self)
    }

    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl TryFrom<u32> for StepIndex {
    type Error = StepIndexError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl TryFrom<i64> for StepIndex {
    type Error = StepIndexError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let narrowed = u32::try_from(value).map_err(|_err| StepIndexError)?;
        Self::try_new(narrowed)
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lowercased, whitespace-collapsed form of a label used for identity.
#[must_use]
pub fn identity_key(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
