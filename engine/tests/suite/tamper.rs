//! Hash-chain linkage and tamper detection.

use serde_json::json;
use waypoint_engine::hash_chain::compute_proof_hash;
use waypoint_engine::{AuditVerdict, ChainId, ProofHash, ProofStatus};
use waypoint_store::ProofStore;

use crate::common::{CHECKPOINT, DEPLOY_SERVICE, comment, exit, memory_engine, step_id};

#[tokio::test]
async fn each_proof_links_to_its_predecessor() {
    let (engine, store) = memory_engine();
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();
    let step1 = step_id("Deploy Service", 1);
    let step2 = step_id("Deploy Service", 2);

    engine.next(step1, exit(0)).await.unwrap();
    engine
        .next(step2, comment("announced in #releases"))
        .await
        .unwrap();

    let first = store.get_result(step1).unwrap().unwrap();
    let second = store.get_result(step2).unwrap().unwrap();
    assert_eq!(first.previous_hash, ProofHash::GENESIS);
    assert_eq!(second.previous_hash, first.proof_hash);
    assert_eq!(
        store.get_proof_hash(step1).unwrap(),
        Some(first.proof_hash)
    );
}

#[tokio::test]
async fn content_only_steps_are_skipped_by_the_link() {
    let (engine, store) = memory_engine();
    engine.mint(CHECKPOINT, false).await.unwrap();
    let migrate = step_id("Database Migration", 1);
    let record = step_id("Database Migration", 3);

    engine.next(migrate, exit(0)).await.unwrap();
    engine
        .next(step_id("Database Migration", 2), None)
        .await
        .unwrap();
    engine
        .next(record, comment("schema diff reviewed"))
        .await
        .unwrap();

    let first = store.get_result(migrate).unwrap().unwrap();
    let third = store.get_result(record).unwrap().unwrap();
    assert_eq!(third.previous_hash, first.proof_hash);
    assert!(
        engine
            .audit(ChainId::from_label("Database Migration"))
            .unwrap()
            .is_intact()
    );
}

#[tokio::test]
async fn edited_evidence_is_detected() {
    let (engine, store) = memory_engine();
    let chain_id = ChainId::from_label("Deploy Service");
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();
    let step1 = step_id("Deploy Service", 1);
    engine.next(step1, exit(1)).await.unwrap_err();

    let mut forged = store.get_result(step1).unwrap().unwrap();
    forged.evidence["exit_code"] = json!(0);
    forged.status = ProofStatus::Success;
    store.overwrite_result_unchecked(forged).unwrap();

    let audit = engine.audit(chain_id).unwrap();
    assert!(!audit.is_intact());
    assert_eq!(audit.steps[0].verdict, AuditVerdict::HashMismatch);
}

#[tokio::test]
async fn rehashed_forgery_breaks_the_next_link() {
    let (engine, store) = memory_engine();
    let chain_id = ChainId::from_label("Deploy Service");
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();
    let step1 = step_id("Deploy Service", 1);
    let step2 = step_id("Deploy Service", 2);
    engine.next(step1, exit(0)).await.unwrap();
    engine
        .next(step2, comment("announced in #releases"))
        .await
        .unwrap();

    let mut forged = store.get_result(step1).unwrap().unwrap();
    forged.evidence["duration_ms"] = json!(1);
    forged.proof_hash = compute_proof_hash(step1, &forged.evidence, forged.previous_hash);
    store.overwrite_result_unchecked(forged).unwrap();

    let audit = engine.audit(chain_id).unwrap();
    assert_eq!(audit.steps[0].verdict, AuditVerdict::Verified);
    assert_eq!(audit.steps[1].verdict, AuditVerdict::BrokenLink);
    assert_eq!(audit.first_break().map(|s| s.step_index.value()), Some(2));
}

#[tokio::test]
async fn resubmitting_identical_evidence_keeps_the_chain_verified() {
    let (engine, store) = memory_engine();
    let chain_id = ChainId::from_label("Deploy Service");
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();
    let step1 = step_id("Deploy Service", 1);
    let step2 = step_id("Deploy Service", 2);

    engine.next(step1, exit(0)).await.unwrap();
    engine
        .next(step2, comment("announced in #releases"))
        .await
        .unwrap();
    let first_hash = store.get_proof_hash(step1).unwrap();

    let retried = engine.next(step1, exit(0)).await.unwrap();
    assert_eq!(
        retried.recorded.map(|r| r.proof_hash),
        first_hash,
        "same evidence seals to the same hash"
    );
    assert_eq!(store.get_proof_hash(step1).unwrap(), first_hash);
    assert_eq!(
        store.get_result(step2).unwrap().unwrap().previous_hash,
        first_hash.unwrap()
    );

    let audit = engine.audit(chain_id).unwrap();
    assert!(audit.is_intact());
    assert!(
        audit
            .steps
            .iter()
            .all(|step| step.verdict == AuditVerdict::Verified)
    );
}
