//! The engine over the SQLite store, including a reopen.

use std::sync::Arc;

use tempfile::tempdir;
use waypoint_engine::{AttestOutcome, ChainId, ChainState, Engine, ErrorCode};
use waypoint_store::SqliteStore;

use crate::common::{DEPLOY_SERVICE, comment, exit, step_id};

fn open(path: &std::path::Path) -> Engine {
    let store = Arc::new(SqliteStore::open(path).unwrap());
    Engine::new(store)
}

#[tokio::test]
async fn progress_survives_reopen() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("waypoint.db");
    let chain_id = ChainId::from_label("Deploy Service");

    {
        let engine = open(&db);
        engine.mint(DEPLOY_SERVICE, false).await.unwrap();
        engine
            .next(step_id("Deploy Service", 1), exit(0))
            .await
            .unwrap();
    }

    let engine = open(&db);
    assert_eq!(
        engine.status(chain_id).unwrap().state,
        ChainState::AwaitingProof {
            step_index: waypoint_engine::StepIndex::try_new(2).unwrap()
        }
    );
    let err = engine.mint(DEPLOY_SERVICE, false).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateChain);

    engine
        .next(step_id("Deploy Service", 2), comment("release notes posted"))
        .await
        .unwrap();
    engine
        .attest(step_id("Deploy Service", 2), AttestOutcome::Success, "shipped")
        .await
        .unwrap();
    assert!(engine.audit(chain_id).unwrap().is_intact());

    drop(engine);
    let engine = open(&db);
    assert_eq!(
        engine.status(chain_id).unwrap().state,
        ChainState::Attested {
            outcome: AttestOutcome::Success
        }
    );
}

#[tokio::test]
async fn forced_remint_clears_sqlite_state() {
    let dir = tempdir().unwrap();
    let engine = open(&dir.path().join("waypoint.db"));
    let chain_id = ChainId::from_label("Deploy Service");

    engine.mint(DEPLOY_SERVICE, false).await.unwrap();
    engine
        .next(step_id("Deploy Service", 1), exit(0))
        .await
        .unwrap();
    engine.mint(DEPLOY_SERVICE, true).await.unwrap();

    assert_eq!(engine.status(chain_id).unwrap().state, ChainState::NotStarted);
}
