//! Progression State Machine.
//!
//! ```text
//! NotStarted ─begin─▶ AwaitingProof(1) ─next─▶ AwaitingProof(k+1) … ─▶ Completed ─attest─▶ Attested
//! ```
//!
//! Every `next` holds its chain's lock from the first read to the last write,
//! so two submissions for the same chain never both observe the same
//! "current" proof state.

use std::sync::Arc;

use waypoint_config::WaypointConfig;
use waypoint_store::{ChainStore, ProofStore, StepStore};
use waypoint_types::{
    AttestOutcome, Attestation, ChainId, Challenge, ChallengeKind, ErrorCode, NonEmptyString,
    ProofDefinition, ProofHash, ProofResult, Rejection, Solution, Step, StepId, StepIndex,
};

use crate::builder::{BuildError, ChainBuilder};
use crate::confirmation::ConfirmationChannel;
use crate::hash_chain::{ChainAudit, audit_chain, preceding_hash};
use crate::locks::ChainLocks;
use crate::navigator::{Predecessor, Routing, StepNavigator, missing_proof, route};
use crate::ranking::Ranker;
use crate::resolver::{ChainResolver, Resolution};
use crate::response::{
    AppliedTo, AttestReceipt, BeginOutcome, ChainState, ChainStatus, MintedChain, NextOutcome,
    RecordedProof, StepStatus, StepView,
};
use crate::settings::{BuilderSettings, EngineSettings};
use crate::verifier::{Verification, Verifier, confirmation_channel_required};

/// What `begin` should start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginTarget {
    /// Free text, resolved through the ranking collaborator.
    Query(String),
    Chain(ChainId),
    /// Any step of a chain; the chain is started from its head.
    Step(StepId),
}

trait OrReject<T> {
    fn or_reject(self) -> Result<T, Rejection>;
}

impl<T> OrReject<T> for anyhow::Result<T> {
    fn or_reject(self) -> Result<T, Rejection> {
        self.map_err(|err| {
            tracing::error!("Store operation failed: {err:#}");
            Rejection::storage(&err)
        })
    }
}

fn reject<T>(rejection: Rejection) -> Result<T, Rejection> {
    tracing::warn!(code = %rejection.code, "{}", rejection.message);
    Err(rejection)
}

pub struct Engine {
    store: Arc<dyn ChainStore>,
    ranker: Option<Arc<dyn Ranker>>,
    confirmation: Option<Arc<dyn ConfirmationChannel>>,
    settings: EngineSettings,
    builder: ChainBuilder,
    locks: ChainLocks,
}

impl Engine {
    pub fn new(store: Arc<dyn ChainStore>) -> Self {
        Self {
            store,
            ranker: None,
            confirmation: None,
            settings: EngineSettings::default(),
            builder: ChainBuilder::default(),
            locks: ChainLocks::new(),
        }
    }

    /// Engine with settings resolved from a loaded config file.
    pub fn from_config(config: &WaypointConfig, store: Arc<dyn ChainStore>) -> Self {
        Self::new(store)
            .with_settings(EngineSettings::from_config(config))
            .with_builder_settings(BuilderSettings::from_config(config))
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_builder_settings(mut self, settings: BuilderSettings) -> Self {
        self.builder = ChainBuilder::new(settings);
        self
    }

    #[must_use]
    pub fn with_ranker(mut self, ranker: Arc<dyn Ranker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    #[must_use]
    pub fn with_confirmation_channel(mut self, channel: Arc<dyn ConfirmationChannel>) -> Self {
        self.confirmation = Some(channel);
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn navigator(&self) -> StepNavigator<'_> {
        StepNavigator::new(self.store.as_ref())
    }

    fn verifier(&self) -> Verifier {
        Verifier::new(self.settings.evidence_summary_chars)
    }

    fn step(&self, step_id: StepId) -> Result<Step, Rejection> {
        match self.store.get_step_by_id(step_id).or_reject()? {
            Some(step) => Ok(step),
            None => reject(Rejection::not_found(format_args!("step {step_id}"))),
        }
    }

    fn chain(&self, chain_id: ChainId) -> Result<Vec<Step>, Rejection> {
        let steps = self.store.find_steps_by_chain(chain_id).or_reject()?;
        if steps.is_empty() {
            return reject(Rejection::not_found(format_args!("chain {chain_id}")));
        }
        Ok(steps)
    }

    fn results(&self, steps: &[Step]) -> Result<Vec<Option<ProofResult>>, Rejection> {
        steps
            .iter()
            .map(|step| self.store.get_result(step.id).or_reject())
            .collect()
    }

    // ── mint ────────────────────────────────────────────────────────────

    /// Build `document` and store every chain in it.
    ///
    /// The whole document is written in one store call or not at all. An
    /// existing chain id without `force` rejects the whole document; with
    /// `force` the old chain's steps, proofs and attestation are replaced.
    pub async fn mint(&self, document: &str, force: bool) -> Result<Vec<MintedChain>, Rejection> {
        let built = match self.builder.build(document) {
            Ok(built) => built,
            Err(BuildError::DuplicateLabel { label }) => {
                return reject(
                    Rejection::new(
                        ErrorCode::DuplicateChain,
                        format!("the document defines the chain \"{label}\" more than once"),
                    )
                    .with_remediation("give each top-level section a distinct title"),
                );
            }
            Err(err) => {
                return reject(
                    Rejection::new(ErrorCode::InvalidDocument, err.to_string()).with_remediation(
                        "use '# ' for chain titles, '## ' for steps, and a valid challenge block",
                    ),
                );
            }
        };

        let mut chain_ids: Vec<ChainId> = built.iter().map(|chain| chain.chain_id).collect();
        chain_ids.sort();
        let mut guards = Vec::with_capacity(chain_ids.len());
        for chain_id in chain_ids {
            guards.push(self.locks.acquire(chain_id).await);
        }

        let mut existing = Vec::with_capacity(built.len());
        for chain in &built {
            let steps = self.store.find_steps_by_chain(chain.chain_id).or_reject()?;
            if !steps.is_empty() && !force {
                return reject(
                    Rejection::new(
                        ErrorCode::DuplicateChain,
                        format!(
                            "a chain titled \"{}\" already exists ({})",
                            chain.label, chain.chain_id
                        ),
                    )
                    .with_remediation(
                        "begin the existing chain, or mint again with force to replace it",
                    ),
                );
            }
            existing.push(!steps.is_empty());
        }

        let steps: Vec<Step> = built
            .iter()
            .flat_map(|chain| chain.steps.iter().cloned())
            .collect();
        self.store.replace_chains(&steps).or_reject()?;

        let mut minted = Vec::with_capacity(built.len());
        for (chain, replaced) in built.into_iter().zip(existing) {
            tracing::info!(
                chain_id = %chain.chain_id,
                label = %chain.label,
                step_count = chain.steps.len(),
                replaced,
                "Minted chain"
            );

            let Some(head) = chain.steps.first() else {
                continue;
            };
            minted.push(MintedChain {
                chain_id: chain.chain_id,
                label: chain.label.clone(),
                step_count: head.chain_ref.step_count,
                replaced,
                head: StepView::from(head),
            });
        }
        drop(guards);
        Ok(minted)
    }

    // ── begin ───────────────────────────────────────────────────────────

    pub async fn begin(&self, target: BeginTarget) -> Result<BeginOutcome, Rejection> {
        let navigator = self.navigator();
        let head = match target {
            BeginTarget::Query(query) => return self.begin_from_query(&query).await,
            BeginTarget::Chain(chain_id) => navigator.head(chain_id).or_reject()?,
            BeginTarget::Step(step_id) => {
                let step = self.step(step_id)?;
                navigator.head_of(&step).or_reject()?
            }
        };
        match head {
            Some(head) => {
                tracing::info!(chain_id = %head.chain_id(), "Beginning chain");
                Ok(BeginOutcome::commit(&head))
            }
            None => reject(Rejection::not_found("chain head")),
        }
    }

    async fn begin_from_query(&self, query: &str) -> Result<BeginOutcome, Rejection> {
        let Some(ranker) = &self.ranker else {
            return reject(
                Rejection::new(
                    ErrorCode::CapabilityRequired,
                    "no ranking collaborator is configured to resolve a query",
                )
                .with_remediation("begin with an explicit chain_id instead"),
            );
        };
        let candidates = ranker.rank_candidates(query).await.or_reject()?;
        tracing::debug!(query, candidates = candidates.len(), "Ranked candidates");

        let resolver = ChainResolver::new(self.settings.relevance_floor);
        let outcome = match resolver
            .resolve(&self.navigator(), candidates)
            .or_reject()?
        {
            Resolution::Commit(head) => BeginOutcome::commit(&head),
            Resolution::Choice(options) => BeginOutcome::choose(&options),
            Resolution::BestEffort { step, score } => BeginOutcome::best_effort(&step, score),
            Resolution::NoMatch => BeginOutcome::no_match(),
        };
        Ok(outcome)
    }

    // ── next ────────────────────────────────────────────────────────────

    /// Submit `solution` for `step_id` and advance past it.
    ///
    /// A rejection leaves the stores untouched, except that an evaluated
    /// solution which fails verification is recorded as a failure first.
    pub async fn next(
        &self,
        step_id: StepId,
        solution: Option<Solution>,
    ) -> Result<NextOutcome, Rejection> {
        let current = self.step(step_id)?;
        let chain_id = current.chain_id();
        let _guard = self.locks.acquire(chain_id).await;

        let chain = self.chain(chain_id)?;
        let results = self.results(&chain)?;
        let earlier: Vec<Predecessor<'_>> = chain
            .iter()
            .zip(&results)
            .take_while(|(step, _)| step.index() < current.index())
            .map(|(step, result)| Predecessor {
                step,
                result: result.as_ref(),
            })
            .collect();

        let routing = route(&current, &earlier, solution.is_some());
        tracing::debug!(%chain_id, step_index = %current.index(), ?routing, "Routed submission");
        let (target, applied_to) = match routing {
            Routing::Blocked(rejection) => return reject(rejection),
            Routing::AppliedToCurrent => (&current, AppliedTo::Current),
            Routing::AppliedToPrevious => match earlier.last() {
                Some(previous) => (previous.step, AppliedTo::Previous),
                None => (&current, AppliedTo::Current),
            },
        };

        let recorded = match &target.proof_of_work {
            None => {
                if solution.is_some() {
                    tracing::debug!(step_id = %target.id, "Content-only step; solution not needed");
                }
                None
            }
            Some(definition) => {
                match self.evaluate(target, definition, solution).await? {
                    Some(verification) => {
                        let previous_hash = preceding_hash(&results, target.index());
                        Some(self.record(target, verification, previous_hash, applied_to)?)
                    }
                    None => None,
                }
            }
        };

        match self.navigator().next(&current).or_reject()? {
            Some(next) => {
                tracing::info!(
                    %chain_id,
                    from = %current.index(),
                    to = %next.index(),
                    "Advanced chain"
                );
                Ok(NextOutcome::advanced(recorded, &next))
            }
            None => {
                tracing::info!(%chain_id, "Chain completed");
                Ok(NextOutcome::completed(recorded, &current))
            }
        }
    }

    /// Evaluate a solution for `step`. `Ok(None)` means an optional proof was
    /// skipped.
    async fn evaluate(
        &self,
        step: &Step,
        definition: &ProofDefinition,
        solution: Option<Solution>,
    ) -> Result<Option<Verification>, Rejection> {
        if let Challenge::UserConfirmation { prompt } = &definition.challenge {
            return match solution {
                None | Some(Solution::UserConfirmation) => {
                    self.confirm(step, prompt).await.map(Some)
                }
                Some(other) => match self.verifier().evaluate(definition, &other) {
                    Err(rejection) => reject(rejection),
                    Ok(_) => reject(confirmation_channel_required()),
                },
            };
        }

        match solution {
            Some(solution) => match self.verifier().evaluate(definition, &solution) {
                Ok(verification) => Ok(Some(verification)),
                Err(rejection) => reject(rejection),
            },
            None if definition.required => reject(missing_proof(step)),
            None => {
                tracing::debug!(step_id = %step.id, "Optional proof skipped");
                Ok(None)
            }
        }
    }

    async fn confirm(&self, step: &Step, prompt: &str) -> Result<Verification, Rejection> {
        let Some(channel) = &self.confirmation else {
            return reject(confirmation_channel_required());
        };
        let timeout = self.settings.confirmation_timeout;
        tracing::info!(step_id = %step.id, "Requesting user confirmation");
        match tokio::time::timeout(timeout, channel.request_confirmation(prompt)).await {
            Ok(Ok(outcome)) => Ok(self.verifier().evaluate_confirmation(prompt, outcome)),
            Ok(Err(err)) => reject(
                Rejection::new(
                    ErrorCode::CapabilityRequired,
                    format!("confirmation channel failed: {err:#}"),
                )
                .with_remediation("retry once the confirmation channel is reachable"),
            ),
            Err(_) => reject(
                Rejection::new(
                    ErrorCode::ConfirmationTimeout,
                    format!(
                        "no confirmation for step {} within {}s",
                        step.position(),
                        timeout.as_secs()
                    ),
                )
                .with_remediation(format!(
                    "ask the user to confirm \"{prompt}\", then call next on step {} again",
                    step.id
                )),
            ),
        }
    }

    /// Persist a verification. A failed one is stored and then rejected.
    fn record(
        &self,
        step: &Step,
        verification: Verification,
        previous_hash: ProofHash,
        applied_to: AppliedTo,
    ) -> Result<RecordedProof, Rejection> {
        let result = verification.seal(step.id, previous_hash);
        self.store.put_result(step.id, &result).or_reject()?;
        tracing::info!(
            step_id = %step.id,
            step_index = %step.index(),
            status = result.status.as_str(),
            proof_hash = %result.proof_hash,
            ?applied_to,
            "Recorded proof"
        );

        if !result.status.is_success() {
            let code = match step.proof_of_work.as_ref().map(ProofDefinition::kind) {
                Some(ChallengeKind::Shell) => ErrorCode::CommandFailed,
                _ => ErrorCode::VerificationFailed,
            };
            let instructions = step
                .proof_of_work
                .as_ref()
                .map(ProofDefinition::instructions)
                .unwrap_or_default();
            return reject(
                Rejection::new(
                    code,
                    format!(
                        "proof for step {} \"{}\" failed: {}",
                        step.position(),
                        step.label,
                        result.evidence_summary
                    ),
                )
                .with_remediation(format!(
                    "fix the problem, then {}",
                    lowercase_first(&instructions)
                )),
            );
        }

        Ok(RecordedProof {
            step_id: step.id,
            step_index: step.index(),
            status: result.status,
            proof_hash: result.proof_hash,
            evidence_summary: result.evidence_summary,
            applied_to,
        })
    }

    // ── attest ──────────────────────────────────────────────────────────

    /// Record a summary judgment for the chain `step_id` belongs to.
    ///
    /// Always permitted regardless of proof state; outstanding required
    /// proofs are reported, not enforced.
    pub async fn attest(
        &self,
        step_id: StepId,
        outcome: AttestOutcome,
        message: &str,
    ) -> Result<AttestReceipt, Rejection> {
        let Ok(message) = NonEmptyString::new(message.trim()) else {
            return reject(
                Rejection::new(ErrorCode::InvalidRequest, "attestation message is empty")
                    .with_remediation("describe the outcome in a sentence"),
            );
        };
        let step = self.step(step_id)?;
        let chain_id = step.chain_id();
        let _guard = self.locks.acquire(chain_id).await;

        let chain = self.chain(chain_id)?;
        let results = self.results(&chain)?;
        let Some(last) = chain.last() else {
            return reject(Rejection::not_found(format_args!("chain {chain_id}")));
        };

        let attestation = Attestation {
            chain_id,
            step_id: last.id,
            outcome,
            message,
            recorded_at: chrono::Utc::now(),
        };
        self.store.put_attestation(&attestation).or_reject()?;

        let unverified_steps: Vec<StepIndex> = chain
            .iter()
            .zip(&results)
            .filter(|(step, result)| {
                step.requires_proof()
                    && !result.as_ref().is_some_and(|r| r.status.is_success())
            })
            .map(|(step, _)| step.index())
            .collect();
        if unverified_steps.is_empty() {
            tracing::info!(%chain_id, outcome = outcome.as_str(), "Attested chain");
        } else {
            tracing::warn!(
                %chain_id,
                outcome = outcome.as_str(),
                unverified = unverified_steps.len(),
                "Attested chain with unverified required steps"
            );
        }

        Ok(AttestReceipt {
            chain_id,
            step_id: last.id,
            outcome,
            recorded_at: attestation.recorded_at,
            unverified_steps,
        })
    }

    // ── inspection ──────────────────────────────────────────────────────

    pub fn status(&self, chain_id: ChainId) -> Result<ChainStatus, Rejection> {
        let chain = self.chain(chain_id)?;
        let results = self.results(&chain)?;
        let attestation = self.store.get_attestation(chain_id).or_reject()?;

        let blocking = chain.iter().zip(&results).find(|(step, result)| match result {
            Some(result) => !result.status.is_success(),
            None => step.requires_proof(),
        });
        let state = match (attestation, blocking) {
            (Some(attestation), _) => ChainState::Attested {
                outcome: attestation.outcome,
            },
            _ if results.iter().all(Option::is_none) => ChainState::NotStarted,
            (None, Some((step, _))) => ChainState::AwaitingProof {
                step_index: step.index(),
            },
            (None, None) => ChainState::Completed,
        };

        let label = chain
            .first()
            .map(|step| step.label.clone())
            .unwrap_or_default();
        let steps = chain
            .iter()
            .zip(&results)
            .map(|(step, result)| StepStatus {
                step_id: step.id,
                step_index: step.index(),
                label: step.label.clone(),
                requires_proof: step.requires_proof(),
                proof: result.as_ref().map(|r| r.status),
            })
            .collect();

        Ok(ChainStatus {
            chain_id,
            label,
            state,
            steps,
        })
    }

    /// Recompute the chain's proof hashes and links from stored evidence.
    pub fn audit(&self, chain_id: ChainId) -> Result<ChainAudit, Rejection> {
        let chain = self.chain(chain_id)?;
        let results = self.results(&chain)?;
        let audit = audit_chain(chain_id, &chain, &results);
        if let Some(broken) = audit.first_break() {
            tracing::warn!(
                %chain_id,
                step_index = %broken.step_index,
                verdict = ?broken.verdict,
                "Proof chain failed audit"
            );
        }
        Ok(audit)
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => "resubmit the proof".to_owned(),
    }
}
