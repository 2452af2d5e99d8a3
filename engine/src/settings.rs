//! Resolved runtime settings.
//!
//! `WaypointConfig` holds what the user wrote; these structs hold what the
//! engine uses, with every default applied.

use std::time::Duration;

use waypoint_config::{
    DEFAULT_COMMENT_MIN_LENGTH, DEFAULT_CONFIRMATION_TIMEOUT_SECS,
    DEFAULT_EVIDENCE_SUMMARY_CHARS, DEFAULT_RELEVANCE_FLOOR, DEFAULT_SHELL_TIMEOUT_SECS,
    WaypointConfig,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Best-effort matches must score strictly above this.
    pub relevance_floor: f32,
    pub confirmation_timeout: Duration,
    pub evidence_summary_chars: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            relevance_floor: DEFAULT_RELEVANCE_FLOOR,
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            evidence_summary_chars: DEFAULT_EVIDENCE_SUMMARY_CHARS,
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &WaypointConfig) -> Self {
        Self {
            relevance_floor: config.relevance_floor(),
            confirmation_timeout: config.confirmation_timeout(),
            evidence_summary_chars: config.evidence_summary_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderSettings {
    pub default_shell_timeout_secs: u64,
    pub default_comment_min_length: usize,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            default_shell_timeout_secs: DEFAULT_SHELL_TIMEOUT_SECS,
            default_comment_min_length: DEFAULT_COMMENT_MIN_LENGTH,
        }
    }
}

impl BuilderSettings {
    #[must_use]
    pub fn from_config(config: &WaypointConfig) -> Self {
        Self {
            default_shell_timeout_secs: config.default_shell_timeout_secs(),
            default_comment_min_length: config.default_comment_min_length(),
        }
    }
}
