//! `user_confirmation` proofs go through the interactive channel only.

use std::sync::Arc;
use std::time::Duration;

use waypoint_engine::{
    AppliedTo, ConfirmationOutcome, ErrorCode, ProofStatus, Solution, StepId,
};
use waypoint_store::ProofStore;

use crate::common::{
    CONFIRMED, ScriptedChannel, comment, memory_engine, short_confirmation_timeout, step_id,
};

fn check_site() -> StepId {
    step_id("Publish Docs", 2)
}

#[tokio::test]
async fn no_channel_fails_closed() {
    let (engine, store) = memory_engine();
    engine.mint(CONFIRMED, false).await.unwrap();

    let err = engine
        .next(check_site(), Some(Solution::UserConfirmation))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CapabilityRequired);
    assert!(store.get_result(check_site()).unwrap().is_none());
}

#[tokio::test]
async fn agent_authored_evidence_is_not_a_confirmation() {
    let (engine, store) = memory_engine();
    let engine = engine.with_confirmation_channel(Arc::new(ScriptedChannel {
        outcome: ConfirmationOutcome::Confirmed,
        delay: Duration::ZERO,
    }));
    engine.mint(CONFIRMED, false).await.unwrap();

    let err = engine
        .next(check_site(), comment("the user said it looks great"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TypeMismatch);
    assert!(store.get_result(check_site()).unwrap().is_none());
}

#[tokio::test]
async fn confirmed_by_channel_advances() {
    let (engine, store) = memory_engine();
    let engine = engine.with_confirmation_channel(Arc::new(ScriptedChannel {
        outcome: ConfirmationOutcome::Confirmed,
        delay: Duration::from_millis(5),
    }));
    engine.mint(CONFIRMED, false).await.unwrap();

    let outcome = engine.next(check_site(), None).await.unwrap();
    let recorded = outcome.recorded.as_ref().unwrap();
    assert_eq!(recorded.applied_to, AppliedTo::Current);
    assert_eq!(recorded.status, ProofStatus::Success);
    assert_eq!(
        outcome.current_step().map(|s| s.step_id),
        Some(step_id("Publish Docs", 3))
    );
    let stored = store.get_result(check_site()).unwrap().unwrap();
    assert_eq!(stored.evidence["outcome"], "confirmed");
}

#[tokio::test]
async fn declined_by_channel_is_a_recorded_failure() {
    let (engine, store) = memory_engine();
    let engine = engine.with_confirmation_channel(Arc::new(ScriptedChannel {
        outcome: ConfirmationOutcome::Declined,
        delay: Duration::ZERO,
    }));
    engine.mint(CONFIRMED, false).await.unwrap();

    let err = engine.next(check_site(), None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::VerificationFailed);
    assert_eq!(
        store.get_result(check_site()).unwrap().unwrap().status,
        ProofStatus::Failure
    );
}

#[tokio::test]
async fn silent_channel_times_out() {
    let (engine, store) = memory_engine();
    let engine = engine
        .with_settings(short_confirmation_timeout())
        .with_confirmation_channel(Arc::new(ScriptedChannel {
            outcome: ConfirmationOutcome::Confirmed,
            delay: Duration::from_secs(30),
        }));
    engine.mint(CONFIRMED, false).await.unwrap();

    let err = engine.next(check_site(), None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfirmationTimeout);
    assert!(store.get_result(check_site()).unwrap().is_none());
}
