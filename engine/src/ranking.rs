//! Candidate ranking collaborator.
//!
//! Similarity search lives outside the engine. The engine only consumes the
//! ranked candidates and decides what to do with them.

use std::future::Future;
use std::pin::Pin;

use waypoint_types::Step;

pub type RankFut<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Vec<Candidate>>> + Send + 'a>>;

/// A step the ranker considers relevant, with a score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub step: Step,
    pub score: f32,
}

pub trait Ranker: Send + Sync {
    fn rank_candidates<'a>(&'a self, query: &'a str) -> RankFut<'a>;
}
