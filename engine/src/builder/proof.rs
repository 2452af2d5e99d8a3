//! Proof definition extraction from a step body.
//!
//! Two authoring forms are recognized:
//!
//! ```text
//! - **PROOF OF WORK:** timeout 120s make deploy
//! ```
//!
//! and a fenced block holding `{"challenge": {...}}`. The last fenced challenge
//! in a step wins so illustrative examples earlier in the body are ignored;
//! a fenced challenge takes precedence over a `PROOF OF WORK:` line.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use waypoint_types::{Challenge, ProofDefinition};

use crate::settings::BuilderSettings;
use super::sections::{FenceTracker, Segment};

fn proof_line() -> &'static Regex {
    static PROOF_LINE: OnceLock<Regex> = OnceLock::new();
    PROOF_LINE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:[-*+]\s+)?(?:\*\*|__)?\s*proof[ _-]of[ _-]work\s*(?::\s*(?:\*\*|__)?|(?:\*\*|__)\s*:)\s*(?:\[?timeout\s+(\d+)\s*s\]?\s+)?(.*?)\s*$",
        )
        .expect("valid proof-of-work line regex")
    })
}

/// Challenge body as authored in a fenced block. Missing parameters fall back
/// to builder defaults.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChallengeWire {
    Shell {
        command: String,
        #[serde(default, alias = "timeout_secs")]
        timeout: Option<u64>,
    },
    McpTool {
        #[serde(alias = "tool_name")]
        tool: String,
    },
    UserConfirmation {
        #[serde(default, alias = "message")]
        prompt: Option<String>,
    },
    Comment {
        #[serde(default, alias = "min_chars")]
        min_length: Option<usize>,
    },
}

/// A fenced challenge that could not be turned into a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MalformedChallenge(pub String);

pub(crate) fn extract_definition(
    segment: &Segment<'_>,
    label: &str,
    settings: &BuilderSettings,
) -> Result<Option<ProofDefinition>, MalformedChallenge> {
    if let Some(challenge) = last_fenced_challenge(segment) {
        return parse_challenge(&challenge, label, settings).map(Some);
    }
    Ok(last_proof_line(segment, settings))
}

fn last_proof_line(segment: &Segment<'_>, settings: &BuilderSettings) -> Option<ProofDefinition> {
    let mut fences = FenceTracker::default();
    let mut found = None;
    for line in &segment.lines {
        if fences.observe(line) {
            continue;
        }
        let Some(caps) = proof_line().captures(line) else {
            continue;
        };
        let command = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .trim()
            .trim_matches('`')
            .trim();
        if command.is_empty() {
            continue;
        }
        let timeout_secs = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(settings.default_shell_timeout_secs);
        found = Some(ProofDefinition::required(Challenge::Shell {
            command: command.to_owned(),
            timeout_secs,
        }));
    }
    found
}

fn last_fenced_challenge(segment: &Segment<'_>) -> Option<Value> {
    let mut fences = FenceTracker::default();
    let mut block: Option<Vec<&str>> = None;
    let mut last = None;

    for line in &segment.lines {
        let was_open = block.is_some();
        let fenced = fences.observe(line);
        match (was_open, fenced) {
            (false, true) => block = Some(Vec::new()),
            (true, true) => {
                if !fences.is_open() {
                    let body = block.take().unwrap_or_default().join("\n");
                    if let Some(challenge) = challenge_value(&body) {
                        last = Some(challenge);
                    }
                } else if let Some(lines) = block.as_mut() {
                    lines.push(line);
                }
            }
            _ => {}
        }
    }
    last
}

fn challenge_value(body: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(Value::Object(mut map)) => map.remove("challenge"),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(%err, "Skipping fenced block that is not JSON");
            None
        }
    }
}

fn parse_challenge(
    value: &Value,
    label: &str,
    settings: &BuilderSettings,
) -> Result<ProofDefinition, MalformedChallenge> {
    let required = match value.get("required") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(MalformedChallenge(format!(
                "\"required\" must be a boolean, got {other}"
            )));
        }
    };
    let wire: ChallengeWire = serde_json::from_value(value.clone())
        .map_err(|err| MalformedChallenge(err.to_string()))?;

    let challenge = match wire {
        ChallengeWire::Shell { command, timeout } => {
            let command = command.trim();
            if command.is_empty() {
                return Err(MalformedChallenge("shell command is empty".to_owned()));
            }
            Challenge::Shell {
                command: command.to_owned(),
                timeout_secs: timeout.unwrap_or(settings.default_shell_timeout_secs),
            }
        }
        ChallengeWire::McpTool { tool } => {
            let tool = tool.trim();
            if tool.is_empty() {
                return Err(MalformedChallenge("tool name is empty".to_owned()));
            }
            Challenge::McpTool {
                tool: tool.to_owned(),
            }
        }
        ChallengeWire::UserConfirmation { prompt } => Challenge::UserConfirmation {
            prompt: prompt
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| format!("Confirm that \"{label}\" is complete")),
        },
        ChallengeWire::Comment { min_length } => Challenge::Comment {
            min_length: min_length.unwrap_or(settings.default_comment_min_length),
        },
    };

    Ok(ProofDefinition {
        required,
        challenge,
    })
}
