//! Chain Builder: document text in, ordered steps with proof definitions out.
//!
//! Pure transformation. The same bytes always produce the same chain ids,
//! step ids, and step order.

mod label;
mod proof;
mod sections;

pub use label::normalize_label;

use thiserror::Error;
use waypoint_types::{ChainId, ChainRef, Step, StepId, StepIndex};

use crate::settings::BuilderSettings;
use label::derive_label;
use proof::extract_definition;
use sections::{ChainSection, FenceTracker, Segment, split_document};

/// One chain produced from a document section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltChain {
    pub chain_id: ChainId,
    /// Label of the first step; the chain identity is derived from it.
    pub label: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("document contains no steps")]
    EmptyDocument,
    #[error("step \"{label}\" has an invalid challenge: {reason}")]
    InvalidChallenge { label: String, reason: String },
    #[error("two chains in the document share the label \"{label}\"")]
    DuplicateLabel { label: String },
    #[error("chain \"{label}\" has too many steps")]
    TooManySteps { label: String },
}

#[derive(Debug, Clone, Default)]
pub struct ChainBuilder {
    settings: BuilderSettings,
}

impl ChainBuilder {
    #[must_use]
    pub const fn new(settings: BuilderSettings) -> Self {
        Self { settings }
    }

    /// Build every chain in `document`, in document order.
    pub fn build(&self, document: &str) -> Result<Vec<BuiltChain>, BuildError> {
        let mut chains: Vec<BuiltChain> = Vec::new();
        for section in split_document(document) {
            let Some(chain) = self.build_chain(&section)? else {
                continue;
            };
            if chains.iter().any(|built| built.chain_id == chain.chain_id) {
                return Err(BuildError::DuplicateLabel { label: chain.label });
            }
            chains.push(chain);
        }
        if chains.is_empty() {
            return Err(BuildError::EmptyDocument);
        }
        Ok(chains)
    }

    fn build_chain(&self, section: &ChainSection<'_>) -> Result<Option<BuiltChain>, BuildError> {
        let segments = section.step_segments();
        if segments.is_empty() {
            return Ok(None);
        }

        let labels: Vec<String> = segments
            .iter()
            .enumerate()
            .map(|(pos, segment)| {
                derive_label(segment).unwrap_or_else(|| format!("Step {}", pos + 1))
            })
            .collect();
        let chain_label = labels[0].clone();
        let chain_id = ChainId::from_label(&chain_label);
        let step_count = u32::try_from(segments.len()).map_err(|_| BuildError::TooManySteps {
            label: chain_label.clone(),
        })?;

        let mut steps = Vec::with_capacity(segments.len());
        let mut step_index = StepIndex::FIRST;
        for (segment, label) in segments.into_iter().zip(labels) {
            let proof_of_work = extract_definition(segment, &label, &self.settings).map_err(
                |err| BuildError::InvalidChallenge {
                    label: label.clone(),
                    reason: err.0,
                },
            )?;
            let (content, tags) = content_and_tags(segment);
            steps.push(Step {
                id: StepId::derive(chain_id, step_index),
                label,
                content,
                tags,
                chain_ref: ChainRef {
                    chain_id,
                    step_index,
                    step_count,
                },
                proof_of_work,
            });
            if let Some(next) = step_index.next() {
                step_index = next;
            }
        }

        tracing::debug!(%chain_id, label = %chain_label, step_count, "Built chain");
        Ok(Some(BuiltChain {
            chain_id,
            label: chain_label,
            steps,
        }))
    }
}

/// Step body with `Tags:` lines lifted out into a tag list.
fn content_and_tags(segment: &Segment<'_>) -> (String, Vec<String>) {
    let mut fences = FenceTracker::default();
    let mut tags: Vec<String> = Vec::new();
    let mut body = Vec::with_capacity(segment.lines.len());

    for line in &segment.lines {
        if !fences.observe(line)
            && let Some(list) = tag_list(line)
        {
            for tag in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                let tag = tag.to_lowercase();
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
            continue;
        }
        body.push(*line);
    }

    (body.join("\n").trim().to_owned(), tags)
}

fn tag_list(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let prefix = trimmed.get(..5)?;
    prefix
        .eq_ignore_ascii_case("tags:")
        .then(|| &trimmed[5..])
}
