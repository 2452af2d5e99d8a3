//! Configuration loading for waypoint.
//!
//! ```toml
//! [engine]
//! relevance_floor = 0.3
//! confirmation_timeout_secs = 300
//! evidence_summary_chars = 200
//!
//! [builder]
//! default_shell_timeout_secs = 300
//! default_comment_min_length = 10
//!
//! [store]
//! path = "${HOME}/.waypoint/waypoint.db"
//! ```
//!
//! Every field is optional; a missing file means all defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_RELEVANCE_FLOOR: f32 = 0.3;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_EVIDENCE_SUMMARY_CHARS: usize = 200;
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_COMMENT_MIN_LENGTH: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct WaypointConfig {
    pub engine: Option<EngineConfig>,
    pub builder: Option<BuilderConfig>,
    pub store: Option<StoreConfig>,
}

/// Progression engine knobs.
#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    /// Minimum score (exclusive) for a best-effort chain match.
    pub relevance_floor: Option<f32>,
    /// How long a `user_confirmation` step waits for the interactive channel.
    pub confirmation_timeout_secs: Option<u64>,
    /// Maximum characters kept in a proof's evidence summary.
    pub evidence_summary_chars: Option<usize>,
}

/// Chain builder defaults applied when a document leaves a parameter out.
#[derive(Debug, Default, Deserialize)]
pub struct BuilderConfig {
    pub default_shell_timeout_secs: Option<u64>,
    pub default_comment_min_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. `${VAR}` references are expanded.
    pub path: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl WaypointConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let config: Self = match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        config.validate()?;
        Ok(Some(config))
    }

    /// Reject values the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let floor = self.relevance_floor();
        if !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::Invalid {
                field: "engine.relevance_floor",
                reason: format!("{floor} is outside [0, 1]"),
            });
        }
        if self.confirmation_timeout().is_zero() {
            return Err(ConfigError::Invalid {
                field: "engine.confirmation_timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.evidence_summary_chars() == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.evidence_summary_chars",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.default_shell_timeout_secs() == 0 {
            return Err(ConfigError::Invalid {
                field: "builder.default_shell_timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn relevance_floor(&self) -> f32 {
        self.engine
            .as_ref()
            .and_then(|engine| engine.relevance_floor)
            .unwrap_or(DEFAULT_RELEVANCE_FLOOR)
    }

    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(
            self.engine
                .as_ref()
                .and_then(|engine| engine.confirmation_timeout_secs)
                .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn evidence_summary_chars(&self) -> usize {
        self.engine
            .as_ref()
            .and_then(|engine| engine.evidence_summary_chars)
            .unwrap_or(DEFAULT_EVIDENCE_SUMMARY_CHARS)
    }

    #[must_use]
    pub fn default_shell_timeout_secs(&self) -> u64 {
        self.builder
            .as_ref()
            .and_then(|builder| builder.default_shell_timeout_secs)
            .unwrap_or(DEFAULT_SHELL_TIMEOUT_SECS)
    }

    #[must_use]
    pub fn default_comment_min_length(&self) -> usize {
        self.builder
            .as_ref()
            .and_then(|builder| builder.default_comment_min_length)
            .unwrap_or(DEFAULT_COMMENT_MIN_LENGTH)
    }

    /// Store database path with `${VAR}` expansion, falling back to
    /// `~/.waypoint/waypoint.db`.
    #[must_use]
    pub fn store_path(&self) -> Option<PathBuf> {
        match self.store.as_ref().and_then(|store| store.path.as_deref()) {
            Some(raw) => Some(PathBuf::from(expand_env_vars(raw))),
            None => data_dir().map(|dir| dir.join("waypoint.db")),
        }
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out
}

fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".waypoint"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("config.toml"))
}
