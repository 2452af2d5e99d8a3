//! SQLite-backed step and proof storage.
//!
//! One table per record kind: `chains` (identity dedup), `steps` keyed by id
//! with a unique `(chain_id, step_index)`, `proof_results` keyed by step id and
//! `attestations` keyed by chain id. Structured fields (tags, proof definitions,
//! evidence) are stored as JSON text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use waypoint_types::{
    Attestation, ChainId, ChainRef, NonEmptyString, ProofDefinition, ProofResult, Step, StepId,
    StepIndex,
};

use crate::sqlite_util::{decode_time, encode_time, open_secure_db};
use crate::{ChainStore, ProofStore, StepStore, ensure_result_key};

pub struct SqliteStore {
    db: Mutex<Connection>,
}

type StepRow = (
    String,
    String,
    i64,
    i64,
    String,
    String,
    String,
    Option<String>,
);

type ResultRow = (String, String, String, String, String, String, String);

type AttestationRow = (String, String, String, String, String);

impl SqliteStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS chains (
            chain_id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            step_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS steps (
            id TEXT PRIMARY KEY,
            chain_id TEXT NOT NULL,
            step_index INTEGER NOT NULL,
            step_count INTEGER NOT NULL,
            label TEXT NOT NULL,
            content TEXT NOT NULL,
            tags TEXT NOT NULL,
            proof_of_work TEXT,
            UNIQUE (chain_id, step_index),
            FOREIGN KEY (chain_id) REFERENCES chains(chain_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS proof_results (
            step_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            proof_hash TEXT NOT NULL,
            previous_hash TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            evidence_summary TEXT NOT NULL,
            evidence TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS attestations (
            chain_id TEXT PRIMARY KEY,
            step_id TEXT NOT NULL,
            outcome TEXT NOT NULL,
            message TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_steps_chain
        ON steps(chain_id, step_index);
    ";

    /// Open or create the store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = open_secure_db(path)?;
        tracing::debug!(path = %path.display(), "Opened waypoint store");
        Self::initialize(db)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )
        .context("Failed to set store pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create store schema")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("store connection lock poisoned"))
    }

    fn query_steps(&self, sql: &str, param: &str) -> Result<Vec<Step>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(sql).context("Failed to prepare step query")?;
        let rows = stmt
            .query_map([param], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })
            .context("Failed to query steps")?;

        let mut steps = Vec::new();
        for row in rows {
            let row: StepRow = row.context("Failed to read step row")?;
            steps.push(step_from_row(row)?);
        }
        Ok(steps)
    }
}

const STEP_COLUMNS: &str =
    "id, chain_id, step_index, step_count, label, content, tags, proof_of_work";

fn step_from_row(row: StepRow) -> Result<Step> {
    let (id, chain_id, step_index, step_count, label, content, tags, proof_of_work) = row;
    let step_index = StepIndex::try_from(step_index)
        .with_context(|| format!("Invalid step_index for step {id}"))?;
    let tags: Vec<String> =
        serde_json::from_str(&tags).with_context(|| format!("Invalid tags for step {id}"))?;
    let proof_of_work = proof_of_work
        .map(|raw| serde_json::from_str::<ProofDefinition>(&raw))
        .transpose()
        .with_context(|| format!("Invalid proof definition for step {id}"))?;
    Ok(Step {
        id: id.parse().with_context(|| format!("Invalid step id {id:?}"))?,
        label,
        content,
        tags,
        chain_ref: ChainRef {
            chain_id: chain_id
                .parse()
                .with_context(|| format!("Invalid chain id {chain_id:?}"))?,
            step_index,
            step_count: u32::try_from(step_count)
                .with_context(|| format!("Invalid step_count for step {id}"))?,
        },
        proof_of_work,
    })
}

fn result_from_row(row: ResultRow) -> Result<ProofResult> {
    let (step_id, status, proof_hash, previous_hash, recorded_at, evidence_summary, evidence) =
        row;
    Ok(ProofResult {
        step_id: step_id
            .parse()
            .with_context(|| format!("Invalid step id {step_id:?}"))?,
        status: status.parse().map_err(|err: String| anyhow!(err))?,
        proof_hash: proof_hash
            .parse()
            .with_context(|| format!("Invalid proof hash for step {step_id}"))?,
        previous_hash: previous_hash
            .parse()
            .with_context(|| format!("Invalid previous hash for step {step_id}"))?,
        recorded_at: decode_time(&recorded_at)?,
        evidence_summary,
        evidence: serde_json::from_str(&evidence)
            .with_context(|| format!("Invalid evidence for step {step_id}"))?,
    })
}

fn attestation_from_row(row: AttestationRow) -> Result<Attestation> {
    let (chain_id, step_id, outcome, message, recorded_at) = row;
    Ok(Attestation {
        chain_id: chain_id
            .parse()
            .with_context(|| format!("Invalid chain id {chain_id:?}"))?,
        step_id: step_id
            .parse()
            .with_context(|| format!("Invalid step id {step_id:?}"))?,
        outcome: outcome.parse().map_err(|err: String| anyhow!(err))?,
        message: NonEmptyString::new(message)
            .with_context(|| format!("Empty attestation message for chain {chain_id}"))?,
        recorded_at: decode_time(&recorded_at)?,
    })
}

/// Insert or update `steps` (and their chain rows) inside `tx`.
fn write_steps(tx: &Transaction<'_>, steps: &[Step]) -> Result<()> {
    let created_at = encode_time(&Utc::now());
    for step in steps {
        if step.chain_ref.is_head() {
            tx.execute(
                "INSERT INTO chains (chain_id, label, step_count, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chain_id) DO UPDATE SET
                    label = excluded.label,
                    step_count = excluded.step_count",
                params![
                    step.chain_id().to_string(),
                    &step.label,
                    i64::from(step.chain_ref.step_count),
                    &created_at
                ],
            )
            .with_context(|| format!("Failed to upsert chain {}", step.chain_id()))?;
        }
    }

    for step in steps {
        let tags = serde_json::to_string(&step.tags).context("Failed to encode tags")?;
        let proof_of_work = step
            .proof_of_work
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode proof definition")?;
        tx.execute(
            "INSERT OR IGNORE INTO chains (chain_id, label, step_count, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                step.chain_id().to_string(),
                &step.label,
                i64::from(step.chain_ref.step_count),
                &created_at
            ],
        )
        .with_context(|| format!("Failed to register chain {}", step.chain_id()))?;
        tx.execute(
            "INSERT INTO steps
                (id, chain_id, step_index, step_count, label, content, tags, proof_of_work)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                step_count = excluded.step_count,
                label = excluded.label,
                content = excluded.content,
                tags = excluded.tags,
                proof_of_work = excluded.proof_of_work",
            params![
                step.id.to_string(),
                step.chain_id().to_string(),
                i64::from(step.index().value()),
                i64::from(step.chain_ref.step_count),
                &step.label,
                &step.content,
                tags,
                proof_of_work
            ],
        )
        .with_context(|| format!("Failed to upsert step {}", step.id))?;
    }

    Ok(())
}

impl StepStore for SqliteStore {
    fn get_step_by_id(&self, id: StepId) -> Result<Option<Step>> {
        let sql = format!("SELECT {STEP_COLUMNS} FROM steps WHERE id = ?1");
        Ok(self.query_steps(&sql, &id.to_string())?.into_iter().next())
    }

    fn find_steps_by_chain(&self, chain_id: ChainId) -> Result<Vec<Step>> {
        let sql = format!(
            "SELECT {STEP_COLUMNS} FROM steps WHERE chain_id = ?1 ORDER BY step_index ASC"
        );
        self.query_steps(&sql, &chain_id.to_string())
    }

    fn get_step_at(&self, chain_id: ChainId, index: StepIndex) -> Result<Option<Step>> {
        let db = self.conn()?;
        let row: Option<StepRow> = db
            .query_row(
                &format!(
                    "SELECT {STEP_COLUMNS} FROM steps WHERE chain_id = ?1 AND step_index = ?2"
                ),
                params![chain_id.to_string(), i64::from(index.value())],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query step by position")?;
        row.map(step_from_row).transpose()
    }

    fn upsert_steps(&self, steps: &[Step]) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start step transaction")?;
        write_steps(&tx, steps)?;
        tx.commit().context("Failed to commit step transaction")?;
        Ok(())
    }

    fn delete_chain(&self, chain_id: ChainId) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start delete transaction")?;
        tx.execute(
            "DELETE FROM steps WHERE chain_id = ?1",
            [chain_id.to_string()],
        )
        .context("Failed to delete chain steps")?;
        tx.execute(
            "DELETE FROM chains WHERE chain_id = ?1",
            [chain_id.to_string()],
        )
        .context("Failed to delete chain")?;
        tx.commit().context("Failed to commit delete transaction")?;
        Ok(())
    }
}

impl ProofStore for SqliteStore {
    fn get_result(&self, step_id: StepId) -> Result<Option<ProofResult>> {
        let db = self.conn()?;
        let row: Option<ResultRow> = db
            .query_row(
                "SELECT step_id, status, proof_hash, previous_hash, recorded_at,
                        evidence_summary, evidence
                 FROM proof_results WHERE step_id = ?1",
                [step_id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query proof result")?;
        row.map(result_from_row).transpose()
    }

    fn put_result(&self, step_id: StepId, result: &ProofResult) -> Result<()> {
        ensure_result_key(step_id, result)?;
        let evidence = serde_json::to_string(&result.evidence).context("Failed to encode evidence")?;
        self.conn()?
            .execute(
                "INSERT INTO proof_results
                    (step_id, status, proof_hash, previous_hash, recorded_at,
                     evidence_summary, evidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(step_id) DO UPDATE SET
                    status = excluded.status,
                    proof_hash = excluded.proof_hash,
                    previous_hash = excluded.previous_hash,
                    recorded_at = excluded.recorded_at,
                    evidence_summary = excluded.evidence_summary,
                    evidence = excluded.evidence",
                params![
                    step_id.to_string(),
                    result.status.as_str(),
                    result.proof_hash.to_hex(),
                    result.previous_hash.to_hex(),
                    encode_time(&result.recorded_at),
                    &result.evidence_summary,
                    evidence
                ],
            )
            .with_context(|| format!("Failed to write proof result for step {step_id}"))?;
        Ok(())
    }

    fn delete_results(&self, step_ids: &[StepId]) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start proof delete transaction")?;
        for id in step_ids {
            tx.execute(
                "DELETE FROM proof_results WHERE step_id = ?1",
                [id.to_string()],
            )
            .with_context(|| format!("Failed to delete proof result for step {id}"))?;
        }
        tx.commit()
            .context("Failed to commit proof delete transaction")?;
        Ok(())
    }

    fn get_attestation(&self, chain_id: ChainId) -> Result<Option<Attestation>> {
        let db = self.conn()?;
        let row: Option<AttestationRow> = db
            .query_row(
                "SELECT chain_id, step_id, outcome, message, recorded_at
                 FROM attestations WHERE chain_id = ?1",
                [chain_id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query attestation")?;
        row.map(attestation_from_row).transpose()
    }

    fn put_attestation(&self, attestation: &Attestation) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO attestations (chain_id, step_id, outcome, message, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chain_id) DO UPDATE SET
                    step_id = excluded.step_id,
                    outcome = excluded.outcome,
                    message = excluded.message,
                    recorded_at = excluded.recorded_at",
                params![
                    attestation.chain_id.to_string(),
                    attestation.step_id.to_string(),
                    attestation.outcome.as_str(),
                    attestation.message.as_str(),
                    encode_time(&attestation.recorded_at)
                ],
            )
            .with_context(|| {
                format!("Failed to write attestation for chain {}", attestation.chain_id)
            })?;
        Ok(())
    }

    fn delete_attestation(&self, chain_id: ChainId) -> Result<()> {
        self.conn()?
            .execute(
                "DELETE FROM attestations WHERE chain_id = ?1",
                [chain_id.to_string()],
            )
            .context("Failed to delete attestation")?;
        Ok(())
    }
}

impl ChainStore for SqliteStore {
    fn replace_chains(&self, steps: &[Step]) -> Result<()> {
        let mut chain_ids: Vec<String> = steps
            .iter()
            .map(|step| step.chain_id().to_string())
            .collect();
        chain_ids.sort();
        chain_ids.dedup();

        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .context("Failed to start replace transaction")?;
        for chain_id in &chain_ids {
            tx.execute(
                "DELETE FROM proof_results
                 WHERE step_id IN (SELECT id FROM steps WHERE chain_id = ?1)",
                [chain_id],
            )
            .with_context(|| format!("Failed to drop proof results of chain {chain_id}"))?;
            tx.execute("DELETE FROM attestations WHERE chain_id = ?1", [chain_id])
                .with_context(|| format!("Failed to drop attestation of chain {chain_id}"))?;
            tx.execute("DELETE FROM steps WHERE chain_id = ?1", [chain_id])
                .with_context(|| format!("Failed to drop steps of chain {chain_id}"))?;
            tx.execute("DELETE FROM chains WHERE chain_id = ?1", [chain_id])
                .with_context(|| format!("Failed to drop chain {chain_id}"))?;
        }
        write_steps(&tx, steps)?;
        tx.commit().context("Failed to commit replace transaction")?;
        Ok(())
    }
}
