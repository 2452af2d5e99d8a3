//! Chain identity, duplicate detection, and forced replacement.

use std::sync::Arc;

use anyhow::{Result, bail};
use waypoint_engine::{
    AttestOutcome, BuilderSettings, ChainBuilder, ChainId, ChainState, Engine, ErrorCode, Step,
    StepId, is_dense_chain,
};
use waypoint_store::{ChainStore, MemoryStore, ProofStore, StepStore};
use waypoint_types::{Attestation, ProofResult};

use crate::common::{DEPLOY_SERVICE, GATED, exit, memory_engine, step_id};

#[test]
fn rebuilding_yields_the_same_identity_and_order() {
    let builder = ChainBuilder::new(BuilderSettings::default());
    let first = builder.build(DEPLOY_SERVICE).unwrap();
    let second = builder.build(DEPLOY_SERVICE).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].chain_id, ChainId::from_label("Deploy Service"));
    assert!(is_dense_chain(&first[0].steps));
}

#[tokio::test]
async fn minting_the_same_title_twice_is_a_duplicate() {
    let (engine, store) = memory_engine();
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();

    let err = engine.mint(DEPLOY_SERVICE, false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateChain);

    let retitled = DEPLOY_SERVICE.replace("# Deploy Service", "# Step 1: deploy   service");
    let err = engine.mint(&retitled, false).await.unwrap_err();
    assert_eq!(
        err.code,
        ErrorCode::DuplicateChain,
        "cosmetic title changes keep the identity"
    );

    let steps = store
        .find_steps_by_chain(ChainId::from_label("Deploy Service"))
        .unwrap();
    assert_eq!(steps.len(), 2);
}

#[tokio::test]
async fn duplicate_rejection_writes_nothing_for_other_chains() {
    let (engine, store) = memory_engine();
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();

    let combined = format!("{GATED}\n{DEPLOY_SERVICE}");
    let err = engine.mint(&combined, false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateChain);
    assert!(
        store
            .find_steps_by_chain(ChainId::from_label("Gated Release"))
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn same_title_twice_in_one_document_is_a_duplicate() {
    let (engine, _store) = memory_engine();
    let doubled = format!("{GATED}\n{GATED}");
    let err = engine.mint(&doubled, false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateChain);
}

#[tokio::test]
async fn force_replaces_steps_proofs_and_attestation() {
    let (engine, store) = memory_engine();
    let chain_id = ChainId::from_label("Deploy Service");
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();
    engine
        .next(step_id("Deploy Service", 1), exit(0))
        .await
        .unwrap();
    engine
        .attest(step_id("Deploy Service", 1), AttestOutcome::Partial, "halfway")
        .await
        .unwrap();

    let shorter = "# Deploy Service\n\nPROOF OF WORK: ./deploy.sh\n";
    let minted = engine.mint(shorter, true).await.unwrap();
    assert!(minted[0].replaced);
    assert_eq!(minted[0].step_count, 1);

    assert_eq!(store.find_steps_by_chain(chain_id).unwrap().len(), 1);
    assert!(store.get_step_by_id(step_id("Deploy Service", 2)).unwrap().is_none());
    assert!(store.get_result(step_id("Deploy Service", 1)).unwrap().is_none());
    assert!(store.get_attestation(chain_id).unwrap().is_none());
    assert_eq!(engine.status(chain_id).unwrap().state, ChainState::NotStarted);
}

/// Reads and single-key writes pass through; replacing a chain always fails.
struct ReplaceFails(Arc<MemoryStore>);

impl StepStore for ReplaceFails {
    fn get_step_by_id(&self, id: StepId) -> Result<Option<Step>> {
        self.0.get_step_by_id(id)
    }

    fn find_steps_by_chain(&self, chain_id: ChainId) -> Result<Vec<Step>> {
        self.0.find_steps_by_chain(chain_id)
    }

    fn upsert_steps(&self, steps: &[Step]) -> Result<()> {
        self.0.upsert_steps(steps)
    }

    fn delete_chain(&self, chain_id: ChainId) -> Result<()> {
        self.0.delete_chain(chain_id)
    }
}

impl ProofStore for ReplaceFails {
    fn get_result(&self, step_id: StepId) -> Result<Option<ProofResult>> {
        self.0.get_result(step_id)
    }

    fn put_result(&self, step_id: StepId, result: &ProofResult) -> Result<()> {
        self.0.put_result(step_id, result)
    }

    fn delete_results(&self, step_ids: &[StepId]) -> Result<()> {
        self.0.delete_results(step_ids)
    }

    fn get_attestation(&self, chain_id: ChainId) -> Result<Option<Attestation>> {
        self.0.get_attestation(chain_id)
    }

    fn put_attestation(&self, attestation: &Attestation) -> Result<()> {
        self.0.put_attestation(attestation)
    }

    fn delete_attestation(&self, chain_id: ChainId) -> Result<()> {
        self.0.delete_attestation(chain_id)
    }
}

impl ChainStore for ReplaceFails {
    fn replace_chains(&self, _steps: &[Step]) -> Result<()> {
        bail!("disk full")
    }
}

#[tokio::test]
async fn failed_forced_mint_keeps_the_old_chain_and_its_proofs() {
    let (engine, store) = memory_engine();
    let chain_id = ChainId::from_label("Deploy Service");
    let deploy = step_id("Deploy Service", 1);
    engine.mint(DEPLOY_SERVICE, false).await.unwrap();
    engine.next(deploy, exit(0)).await.unwrap();
    let before = store.get_result(deploy).unwrap().unwrap();

    let failing = Engine::new(Arc::new(ReplaceFails(Arc::clone(&store))));
    let shorter = "# Deploy Service\n\nPROOF OF WORK: ./deploy.sh\n";
    let err = failing.mint(shorter, true).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::StorageError);
    assert!(err.message.contains("disk full"));

    assert_eq!(store.find_steps_by_chain(chain_id).unwrap().len(), 2);
    assert_eq!(
        store.get_result(deploy).unwrap().unwrap().proof_hash,
        before.proof_hash
    );
    assert!(engine.audit(chain_id).unwrap().is_intact());
}

#[tokio::test]
async fn unparseable_document_is_invalid() {
    let (engine, _store) = memory_engine();
    let err = engine.mint("   \n\n", false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidDocument);

    let bad_challenge = "# Broken\n\n```json\n{\"challenge\": {\"type\": \"shell\"}}\n```\n";
    let err = engine.mint(bad_challenge, false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidDocument);
    assert!(err.message.contains("Broken"));
}

#[tokio::test]
async fn unknown_chain_status_is_not_found() {
    let (engine, _store) = memory_engine();
    let err = engine.status(ChainId::from_label("ghost")).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}
