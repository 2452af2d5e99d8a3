//! `begin` by query: commit, choice, best-effort, and no-match modes.

use std::sync::Arc;

use waypoint_engine::{BeginOutcome, BeginTarget, Candidate, Engine, ErrorCode, Step};
use waypoint_store::{MemoryStore, StepStore};

use crate::common::{CHECKPOINT, DEPLOY_SERVICE, FixedRanker, GATED, step_id};

async fn engine_with_scores(scores: &[(&str, u32, f32)]) -> Engine {
    let store = Arc::new(MemoryStore::new());
    let seed = Engine::new(store.clone());
    for document in [DEPLOY_SERVICE, GATED, CHECKPOINT] {
        seed.mint(document, false).await.unwrap();
    }

    let candidates = scores
        .iter()
        .map(|(title, index, score)| Candidate {
            step: lookup(&store, title, *index),
            score: *score,
        })
        .collect();
    Engine::new(store).with_ranker(Arc::new(FixedRanker(candidates)))
}

fn lookup(store: &MemoryStore, title: &str, index: u32) -> Step {
    store
        .get_step_by_id(step_id(title, index))
        .unwrap()
        .expect("fixture step exists")
}

async fn begin(engine: &Engine) -> BeginOutcome {
    engine
        .begin(BeginTarget::Query("ship the thing".to_owned()))
        .await
        .unwrap()
}

#[tokio::test]
async fn one_perfect_candidate_commits() {
    let engine = engine_with_scores(&[("Deploy Service", 1, 1.0), ("Gated Release", 1, 0.8)]).await;
    match begin(&engine).await {
        BeginOutcome::Commit { step, .. } => {
            assert_eq!(step.step_id, step_id("Deploy Service", 1));
        }
        other => panic!("expected commit, got {other:?}"),
    }
}

#[tokio::test]
async fn two_perfect_candidates_require_a_choice() {
    let engine = engine_with_scores(&[("Deploy Service", 1, 1.0), ("Gated Release", 1, 1.0)]).await;
    match begin(&engine).await {
        BeginOutcome::Choose {
            options,
            next_action,
        } => {
            assert_eq!(options.len(), 2);
            assert_eq!(
                options[0].step_id,
                step_id("Gated Release", 1),
                "longer chain ranks first"
            );
            assert!(next_action.contains("Do not proceed automatically"));
        }
        other => panic!("expected choice, got {other:?}"),
    }
}

#[tokio::test]
async fn above_floor_is_best_effort() {
    let engine = engine_with_scores(&[("Database Migration", 1, 0.6)]).await;
    match begin(&engine).await {
        BeginOutcome::BestEffort { step, score, .. } => {
            assert_eq!(step.step_id, step_id("Database Migration", 1));
            assert!((score - 0.6).abs() < f32::EPSILON);
        }
        other => panic!("expected best effort, got {other:?}"),
    }
}

#[tokio::test]
async fn below_floor_is_no_match() {
    let engine = engine_with_scores(&[("Database Migration", 1, 0.1)]).await;
    assert!(matches!(begin(&engine).await, BeginOutcome::NoMatch { .. }));
}

#[tokio::test]
async fn mid_chain_candidates_resolve_to_their_head() {
    let engine = engine_with_scores(&[
        ("Gated Release", 3, 1.0),
        ("Gated Release", 2, 1.0),
    ])
    .await;
    match begin(&engine).await {
        BeginOutcome::Commit { step, .. } => {
            assert_eq!(step.step_id, step_id("Gated Release", 1));
        }
        other => panic!("expected commit, got {other:?}"),
    }
}

#[tokio::test]
async fn query_without_ranker_needs_capability() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store);
    let err = engine
        .begin(BeginTarget::Query("anything".to_owned()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CapabilityRequired);
}

#[tokio::test]
async fn direct_step_reference_starts_at_head() {
    let engine = engine_with_scores(&[]).await;
    let outcome = engine
        .begin(BeginTarget::Step(step_id("Gated Release", 2)))
        .await
        .unwrap();
    match outcome {
        BeginOutcome::Commit { step, .. } => {
            assert_eq!(step.step_id, step_id("Gated Release", 1));
        }
        other => panic!("expected commit, got {other:?}"),
    }
}
