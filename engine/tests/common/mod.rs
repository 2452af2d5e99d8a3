//! Shared test utilities and fixtures
//!
//! In-memory engines, scripted collaborators, and the documents the suites
//! mint.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use waypoint_engine::{
    Candidate, ChainId, ConfirmFut, ConfirmationChannel, ConfirmationOutcome, Engine,
    EngineSettings, RankFut, Ranker, Solution, StepId, StepIndex,
};
use waypoint_store::MemoryStore;

pub const DEPLOY_SERVICE: &str = r#"# Deploy Service

Roll the new build out to production.
Tags: ops, release

PROOF OF WORK: timeout 120s ./deploy.sh production

## Announce the release

Tell the team what shipped.

```json
{"challenge": {"type": "comment", "min_length": 10}}
```
"#;

/// Shell gate, shell gate, content-only tail.
pub const GATED: &str = "# Gated Release

PROOF OF WORK: make build

## Run the test suite

PROOF OF WORK: make test

## Celebrate

Nothing to prove here.
";

/// Shell step, content-only step, comment step.
pub const CHECKPOINT: &str = r#"# Database Migration

PROOF OF WORK: ./migrate.sh

## Review the migrated schema

Read the schema diff before continuing.

## Record the review

```json
{"challenge": {"type": "comment", "min_length": 10}}
```
"#;

pub const CONFIRMED: &str = r#"# Publish Docs

## Check the rendered site

```json
{"challenge": {"type": "user_confirmation", "prompt": "Does the site render correctly?"}}
```

## Done
"#;

pub fn memory_engine() -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone());
    (engine, store)
}

pub fn step_id(title: &str, index: u32) -> StepId {
    StepId::derive(
        ChainId::from_label(title),
        StepIndex::try_new(index).expect("fixture index is non-zero"),
    )
}

pub fn exit(code: i32) -> Option<Solution> {
    Some(Solution::Shell {
        exit_code: code,
        output: None,
        duration_ms: Some(1200),
    })
}

pub fn comment(text: &str) -> Option<Solution> {
    Some(Solution::Comment {
        text: text.to_owned(),
    })
}

/// Ranker returning a fixed candidate list for every query.
pub struct FixedRanker(pub Vec<Candidate>);

impl Ranker for FixedRanker {
    fn rank_candidates<'a>(&'a self, _query: &'a str) -> RankFut<'a> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

/// Confirmation channel that answers after an optional delay.
pub struct ScriptedChannel {
    pub outcome: ConfirmationOutcome,
    pub delay: Duration,
}

impl ConfirmationChannel for ScriptedChannel {
    fn request_confirmation<'a>(&'a self, _prompt: &'a str) -> ConfirmFut<'a> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(self.outcome)
        })
    }
}

/// Confirmation channel that answers only once the gate is opened.
pub struct GatedChannel {
    pub gate: Arc<Notify>,
}

impl ConfirmationChannel for GatedChannel {
    fn request_confirmation<'a>(&'a self, _prompt: &'a str) -> ConfirmFut<'a> {
        Box::pin(async move {
            self.gate.notified().await;
            Ok(ConfirmationOutcome::Confirmed)
        })
    }
}

pub fn short_confirmation_timeout() -> EngineSettings {
    EngineSettings {
        confirmation_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    }
}
