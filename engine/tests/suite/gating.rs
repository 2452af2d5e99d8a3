//! Ordering gates and previous-step reinterpretation.

use waypoint_engine::{AppliedTo, ChainId, ChainState, ErrorCode, ProofStatus, Solution};
use waypoint_store::ProofStore;

use crate::common::{CHECKPOINT, GATED, comment, exit, memory_engine, step_id};

#[tokio::test]
async fn next_is_blocked_until_previous_proof_is_recorded() {
    let (engine, store) = memory_engine();
    engine.mint(GATED, false).await.unwrap();
    let build = step_id("Gated Release", 1);
    let test = step_id("Gated Release", 2);

    let err = engine.next(test, exit(0)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingProof);
    let hint = err.remediation.expect("missing proof names the next action");
    assert!(hint.contains("make build"), "hint was: {hint}");
    assert!(
        store.get_result(test).unwrap().is_none(),
        "a rejected call commits nothing"
    );

    engine.next(build, exit(0)).await.unwrap();
    let outcome = engine.next(test, exit(0)).await.unwrap();
    assert_eq!(outcome.recorded.unwrap().step_id, test);
}

#[tokio::test]
async fn required_proof_cannot_be_skipped_with_no_solution() {
    let (engine, store) = memory_engine();
    engine.mint(GATED, false).await.unwrap();
    let build = step_id("Gated Release", 1);

    let err = engine.next(build, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingProof);
    assert!(store.get_result(build).unwrap().is_none());
}

#[tokio::test]
async fn wrong_solution_kind_is_a_type_mismatch() {
    let (engine, store) = memory_engine();
    engine.mint(GATED, false).await.unwrap();
    let build = step_id("Gated Release", 1);

    let err = engine
        .next(build, comment("it built fine, trust me"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TypeMismatch);
    assert!(store.get_result(build).unwrap().is_none());
}

#[tokio::test]
async fn content_only_steps_advance_freely_once_gated_step_passes() {
    let (engine, _store) = memory_engine();
    engine.mint(GATED, false).await.unwrap();

    engine.next(step_id("Gated Release", 1), exit(0)).await.unwrap();
    engine.next(step_id("Gated Release", 2), exit(0)).await.unwrap();
    let outcome = engine
        .next(step_id("Gated Release", 3), None)
        .await
        .unwrap();
    assert!(outcome.is_completed());
    assert!(outcome.recorded.is_none());
}

#[tokio::test]
async fn solution_at_content_step_is_recorded_for_predecessor() {
    let (engine, store) = memory_engine();
    engine.mint(CHECKPOINT, false).await.unwrap();
    let migrate = step_id("Database Migration", 1);
    let review = step_id("Database Migration", 2);

    let outcome = engine.next(review, exit(0)).await.unwrap();
    let recorded = outcome.recorded.as_ref().expect("solution was not discarded");
    assert_eq!(recorded.applied_to, AppliedTo::Previous);
    assert_eq!(recorded.step_id, migrate);
    assert_eq!(
        store.get_result(migrate).unwrap().unwrap().status,
        ProofStatus::Success
    );
    assert!(store.get_result(review).unwrap().is_none());
    assert_eq!(
        outcome.current_step().map(|s| s.step_id),
        Some(step_id("Database Migration", 3))
    );
}

#[tokio::test]
async fn reinterpreted_failure_is_recorded_against_predecessor() {
    let (engine, store) = memory_engine();
    engine.mint(CHECKPOINT, false).await.unwrap();
    let migrate = step_id("Database Migration", 1);
    let review = step_id("Database Migration", 2);

    let err = engine.next(review, exit(3)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::CommandFailed);
    assert_eq!(
        store.get_result(migrate).unwrap().unwrap().status,
        ProofStatus::Failure
    );

    // A late fix still routes back to the migration step.
    let outcome = engine.next(review, exit(0)).await.unwrap();
    assert_eq!(outcome.recorded.unwrap().applied_to, AppliedTo::Previous);
}

#[tokio::test]
async fn content_step_without_solution_waits_for_predecessor() {
    let (engine, _store) = memory_engine();
    engine.mint(CHECKPOINT, false).await.unwrap();

    let err = engine
        .next(step_id("Database Migration", 2), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingProof);
}

#[tokio::test]
async fn mismatched_reinterpreted_solution_is_rejected() {
    let (engine, store) = memory_engine();
    engine.mint(CHECKPOINT, false).await.unwrap();
    let migrate = step_id("Database Migration", 1);

    let err = engine
        .next(
            step_id("Database Migration", 2),
            Some(Solution::Comment {
                text: "migration looked fine".to_owned(),
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TypeMismatch);
    assert!(store.get_result(migrate).unwrap().is_none());
}

#[tokio::test]
async fn rerouted_solution_cannot_skip_an_earlier_required_step() {
    let (engine, store) = memory_engine();
    engine.mint(GATED, false).await.unwrap();
    let build = step_id("Gated Release", 1);
    let test = step_id("Gated Release", 2);

    let err = engine
        .next(step_id("Gated Release", 3), exit(0))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingProof);
    assert!(err.remediation.unwrap().contains("make build"));
    assert!(store.get_result(build).unwrap().is_none());
    assert!(
        store.get_result(test).unwrap().is_none(),
        "the rerouted solution must not be recorded"
    );
}

#[tokio::test]
async fn content_only_step_does_not_hide_an_unproven_step_before_it() {
    let (engine, store) = memory_engine();
    engine.mint(CHECKPOINT, false).await.unwrap();
    let chain_id = ChainId::from_label("Database Migration");
    let record = step_id("Database Migration", 3);

    let err = engine
        .next(record, comment("schema reviewed, all good"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingProof);
    assert!(err.remediation.unwrap().contains("./migrate.sh"));
    assert!(store.get_result(record).unwrap().is_none());
    assert_eq!(engine.status(chain_id).unwrap().state, ChainState::NotStarted);

    engine
        .next(step_id("Database Migration", 1), exit(0))
        .await
        .unwrap();
    let outcome = engine
        .next(record, comment("schema reviewed, all good"))
        .await
        .unwrap();
    assert!(outcome.is_completed());
    assert_eq!(engine.status(chain_id).unwrap().state, ChainState::Completed);
}

#[tokio::test]
async fn earlier_recorded_failure_blocks_past_a_content_step() {
    let (engine, _store) = memory_engine();
    engine.mint(CHECKPOINT, false).await.unwrap();

    engine
        .next(step_id("Database Migration", 1), exit(2))
        .await
        .unwrap_err();
    let err = engine
        .next(
            step_id("Database Migration", 3),
            comment("schema reviewed, all good"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CommandFailed);
}

#[tokio::test]
async fn unknown_step_is_not_found() {
    let (engine, _store) = memory_engine();
    let err = engine
        .next(step_id("Never Minted", 1), exit(0))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}
