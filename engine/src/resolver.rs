//! Chain Resolver: turns ranked candidates into a binding or non-binding pick.
//!
//! | perfect (score ≥ 1.0) | top score > floor | result        |
//! |-----------------------|-------------------|---------------|
//! | exactly one           | -                 | `Commit`      |
//! | two or more           | -                 | `Choice`      |
//! | none                  | yes               | `BestEffort`  |
//! | none                  | no                | `NoMatch`     |

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use waypoint_types::{ChainId, Step};

use crate::navigator::StepNavigator;
use crate::ranking::Candidate;

pub const PERFECT_SCORE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// One perfect match. The caller proceeds with it.
    Commit(Step),
    /// Several perfect matches. The caller must pick; nothing proceeds.
    Choice(Vec<Step>),
    /// Best non-perfect match above the floor. Non-binding.
    BestEffort { step: Step, score: f32 },
    NoMatch,
}

#[derive(Debug, Clone, Copy)]
pub struct ChainResolver {
    relevance_floor: f32,
}

impl ChainResolver {
    #[must_use]
    pub const fn new(relevance_floor: f32) -> Self {
        Self { relevance_floor }
    }

    /// Map candidates to their chain heads, then decide.
    pub fn resolve(
        &self,
        navigator: &StepNavigator<'_>,
        candidates: Vec<Candidate>,
    ) -> Result<Resolution> {
        let mut heads: HashMap<ChainId, Candidate> = HashMap::new();
        for candidate in candidates {
            let score = sanitize_score(candidate.score);
            let Some(head) = navigator.head_of(&candidate.step)? else {
                tracing::warn!(
                    step_id = %candidate.step.id,
                    "Ranked candidate belongs to a chain with no head; skipping"
                );
                continue;
            };
            heads
                .entry(head.chain_id())
                .and_modify(|existing| existing.score = existing.score.max(score))
                .or_insert(Candidate { step: head, score });
        }
        Ok(self.decide(heads.into_values().collect()))
    }

    /// Apply the policy to candidates that are already distinct chain heads.
    #[must_use]
    pub fn decide(&self, mut heads: Vec<Candidate>) -> Resolution {
        heads.sort_by(rank_order);

        let mut perfect: Vec<Step> = heads
            .iter()
            .filter(|c| c.score >= PERFECT_SCORE)
            .map(|c| c.step.clone())
            .collect();
        match perfect.len() {
            0 => {}
            1 => return Resolution::Commit(perfect.swap_remove(0)),
            _ => return Resolution::Choice(perfect),
        }

        match heads.into_iter().next() {
            Some(top) if top.score > self.relevance_floor => Resolution::BestEffort {
                step: top.step,
                score: top.score,
            },
            _ => Resolution::NoMatch,
        }
    }
}

fn sanitize_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, PERFECT_SCORE)
    }
}

/// Highest score first, then most complete chain, then lexical id.
fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.step.chain_ref.step_count.cmp(&a.step.chain_ref.step_count))
        .then_with(|| a.step.id.cmp(&b.step.id))
}
