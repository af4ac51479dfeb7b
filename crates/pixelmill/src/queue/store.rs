//! Persistent queue store for job and batch records
//!
//! SQLite owns the durable representation of both entities; the claim
//! mechanism is an atomic compare-and-set on `state: waiting -> active`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{BatchRecord, JobOutcome, JobRecord, JobState, NewJob};

/// Service interface to the shared queue store
///
/// Injected into both the API layer and the worker pool; all mutation of a
/// job record goes through an atomic claim or a state-guarded write.
pub trait QueueStore: Send + Sync {
    /// Atomically create one batch record and one waiting job per input.
    ///
    /// Record persistence and enqueue are a single transaction, so a job is
    /// never reachable without its batch or vice versa.
    fn create_batch(&self, jobs: Vec<NewJob>) -> Result<BatchRecord>;

    /// Claim the oldest waiting job, transitioning it to `active`.
    ///
    /// Concurrent claims resolve to exactly one winner per job; returns
    /// `None` when no job is waiting.
    fn claim_next_job(&self) -> Result<Option<JobRecord>>;

    /// Transition an active job to `completed` with its result payload.
    fn complete_job(&self, id: Uuid, outcome: &JobOutcome) -> Result<()>;

    /// Transition an active job to `failed` with the captured reason.
    fn fail_job(&self, id: Uuid, reason: &str) -> Result<()>;

    /// Update progress on a job; rejected unless the job is `active`.
    fn update_progress(&self, id: Uuid, progress: f32) -> Result<()>;

    /// Fetch a single job record.
    fn get_job(&self, id: Uuid) -> Result<Option<JobRecord>>;

    /// Fetch a batch record.
    fn get_batch(&self, id: Uuid) -> Result<Option<BatchRecord>>;

    /// Fetch jobs by id, preserving the given order; missing ids are
    /// skipped, not errors.
    fn jobs_for_batch(&self, ids: &[Uuid]) -> Result<Vec<JobRecord>>;

    /// Count jobs currently in `active` state (startup diagnostics).
    fn count_active_jobs(&self) -> Result<usize>;
}

/// SQLite-backed queue store
pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueueStore {
    /// Create or open the store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("Failed to open queue database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL mode for concurrent readers while workers write
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Store(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            -- Job records: one row per input artifact
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL,
                input_path TEXT NOT NULL,
                output_path TEXT NOT NULL,
                original_name TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'waiting',
                result TEXT,
                failure_reason TEXT,
                progress REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
            CREATE INDEX IF NOT EXISTS idx_jobs_batch_id ON jobs(batch_id);

            -- Batch metadata: the job id list serialized as JSON text
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                job_ids TEXT NOT NULL,
                total_files INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_batches_created_at ON batches(created_at);
        "#,
        )
        .map_err(|e| Error::Store(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Queue store migrations complete");
        Ok(())
    }
}

const JOB_COLUMNS: &str = "id, batch_id, input_path, output_path, original_name, state, \
                           result, failure_reason, progress, created_at, started_at, completed_at";

impl QueueStore for SqliteQueueStore {
    fn create_batch(&self, jobs: Vec<NewJob>) -> Result<BatchRecord> {
        let created_at = Utc::now();
        let job_ids: Vec<Uuid> = jobs.iter().map(|_| Uuid::new_v4()).collect();
        let batch = BatchRecord::new(job_ids, created_at);

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Store(format!("Failed to begin transaction: {}", e)))?;

        for (id, job) in batch.job_ids.iter().zip(&jobs) {
            tx.execute(
                r#"
                INSERT INTO jobs (
                    id, batch_id, input_path, output_path, original_name,
                    state, progress, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, 'waiting', 0, ?6)
                "#,
                params![
                    id.to_string(),
                    batch.id.to_string(),
                    job.input_path,
                    job.output_path,
                    job.original_name,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Store(format!("Failed to create job: {}", e)))?;
        }

        let job_ids_json = serde_json::to_string(
            &batch.job_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        )?;

        tx.execute(
            "INSERT INTO batches (id, job_ids, total_files, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                batch.id.to_string(),
                job_ids_json,
                batch.total_files as i64,
                batch.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to create batch: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::Store(format!("Failed to commit batch: {}", e)))?;

        Ok(batch)
    }

    fn claim_next_job(&self) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                r#"
                UPDATE jobs SET state = 'active', started_at = ?1
                WHERE id = (
                    SELECT id FROM jobs WHERE state = 'waiting'
                    ORDER BY created_at, rowid
                    LIMIT 1
                )
                RETURNING {JOB_COLUMNS}
                "#
            ))
            .map_err(|e| Error::Store(format!("Failed to prepare claim: {}", e)))?;

        let job = stmt
            .query_row(params![Utc::now().to_rfc3339()], row_to_job)
            .optional()
            .map_err(|e| Error::Store(format!("Failed to claim job: {}", e)))?;

        Ok(job)
    }

    fn complete_job(&self, id: Uuid, outcome: &JobOutcome) -> Result<()> {
        let result_json = serde_json::to_string(outcome)?;
        let conn = self.conn.lock();

        let updated = conn
            .execute(
                r#"
                UPDATE jobs SET state = 'completed', result = ?2, progress = 100, completed_at = ?3
                WHERE id = ?1 AND state = 'active'
                "#,
                params![id.to_string(), result_json, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::Store(format!("Failed to complete job: {}", e)))?;

        if updated == 0 {
            return Err(Error::Store(format!(
                "Cannot complete job {}: not in active state",
                id
            )));
        }
        Ok(())
    }

    fn fail_job(&self, id: Uuid, reason: &str) -> Result<()> {
        let conn = self.conn.lock();

        let updated = conn
            .execute(
                r#"
                UPDATE jobs SET state = 'failed', failure_reason = ?2, completed_at = ?3
                WHERE id = ?1 AND state = 'active'
                "#,
                params![id.to_string(), reason, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::Store(format!("Failed to record job failure: {}", e)))?;

        if updated == 0 {
            return Err(Error::Store(format!(
                "Cannot fail job {}: not in active state",
                id
            )));
        }
        Ok(())
    }

    fn update_progress(&self, id: Uuid, progress: f32) -> Result<()> {
        let conn = self.conn.lock();

        let updated = conn
            .execute(
                "UPDATE jobs SET progress = ?2 WHERE id = ?1 AND state = 'active'",
                params![id.to_string(), progress as f64],
            )
            .map_err(|e| Error::Store(format!("Failed to update progress: {}", e)))?;

        if updated == 0 {
            return Err(Error::Store(format!(
                "Cannot update progress for job {}: not in active state",
                id
            )));
        }
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .map_err(|e| Error::Store(format!("Failed to prepare query: {}", e)))?;

        let job = stmt
            .query_row(params![id.to_string()], row_to_job)
            .optional()
            .map_err(|e| Error::Store(format!("Failed to get job: {}", e)))?;

        Ok(job)
    }

    fn get_batch(&self, id: Uuid) -> Result<Option<BatchRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT id, job_ids, total_files, created_at FROM batches WHERE id = ?1")
            .map_err(|e| Error::Store(format!("Failed to prepare query: {}", e)))?;

        let batch = stmt
            .query_row(params![id.to_string()], row_to_batch)
            .optional()
            .map_err(|e| Error::Store(format!("Failed to get batch: {}", e)))?;

        Ok(batch)
    }

    fn jobs_for_batch(&self, ids: &[Uuid]) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .map_err(|e| Error::Store(format!("Failed to prepare query: {}", e)))?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let job = stmt
                .query_row(params![id.to_string()], row_to_job)
                .optional()
                .map_err(|e| Error::Store(format!("Failed to fetch job {}: {}", id, e)))?;
            // A missing job (e.g. evicted by retention) is excluded, not an error
            if let Some(job) = job {
                jobs.push(job);
            }
        }

        Ok(jobs)
    }

    fn count_active_jobs(&self) -> Result<usize> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM jobs WHERE state = 'active'", [], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Store(format!("Failed to count active jobs: {}", e)))?;

        Ok(count as usize)
    }
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let result_json: Option<String> = row.get(6)?;
    let result = match result_json {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    let started_at: Option<String> = row.get(10)?;
    let completed_at: Option<String> = row.get(11)?;

    Ok(JobRecord {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        batch_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        input_path: row.get(2)?,
        output_path: row.get(3)?,
        original_name: row.get(4)?,
        state: parse_state(5, &row.get::<_, String>(5)?)?,
        result,
        failure_reason: row.get(7)?,
        progress: row.get::<_, f64>(8)? as f32,
        created_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
        started_at: started_at.map(|s| parse_timestamp(10, &s)).transpose()?,
        completed_at: completed_at.map(|s| parse_timestamp(11, &s)).transpose()?,
    })
}

fn row_to_batch(row: &Row<'_>) -> rusqlite::Result<BatchRecord> {
    let job_ids_json: String = row.get(1)?;
    let raw_ids: Vec<String> = serde_json::from_str(&job_ids_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    let mut job_ids = Vec::with_capacity(raw_ids.len());
    for raw in &raw_ids {
        job_ids.push(parse_uuid(1, raw)?);
    }

    Ok(BatchRecord {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        job_ids,
        total_files: row.get::<_, i64>(2)? as usize,
        created_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
    })
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_state(idx: usize, raw: &str) -> rusqlite::Result<JobState> {
    JobState::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown job state: {}", raw).into(),
        )
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(name: &str) -> NewJob {
        NewJob {
            input_path: format!("uploads/{}", name),
            output_path: format!("processed/processed-{}.jpg", name),
            original_name: name.to_string(),
        }
    }

    fn outcome(job: &JobRecord) -> JobOutcome {
        JobOutcome {
            original_name: job.original_name.clone(),
            output_path: job.output_path.clone(),
        }
    }

    #[test]
    fn test_create_batch_persists_jobs_and_batch() {
        let store = SqliteQueueStore::in_memory().unwrap();

        let batch = store
            .create_batch(vec![new_job("a.png"), new_job("b.png"), new_job("c.png")])
            .unwrap();

        assert_eq!(batch.total_files, 3);
        assert_eq!(batch.job_ids.len(), 3);

        let stored = store.get_batch(batch.id).unwrap().unwrap();
        assert_eq!(stored.job_ids, batch.job_ids);
        assert_eq!(stored.total_files, 3);

        for id in &batch.job_ids {
            let job = store.get_job(*id).unwrap().unwrap();
            assert_eq!(job.state, JobState::Waiting);
            assert_eq!(job.batch_id, batch.id);
            assert!(job.outcome_consistent());
        }
    }

    #[test]
    fn test_claim_is_fifo_and_transitions_to_active() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let batch = store
            .create_batch(vec![new_job("first.png"), new_job("second.png")])
            .unwrap();

        let claimed = store.claim_next_job().unwrap().unwrap();
        assert_eq!(claimed.id, batch.job_ids[0]);
        assert_eq!(claimed.state, JobState::Active);
        assert!(claimed.started_at.is_some());

        let claimed = store.claim_next_job().unwrap().unwrap();
        assert_eq!(claimed.id, batch.job_ids[1]);

        assert!(store.claim_next_job().unwrap().is_none());
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        store.create_batch(vec![new_job("only.png")]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.claim_next_job().unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claim| claim.is_some())
            .count();

        // Exactly one claim wins; the losers observe a non-waiting state
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_complete_sets_result_and_is_terminal() {
        let store = SqliteQueueStore::in_memory().unwrap();
        store.create_batch(vec![new_job("a.png")]).unwrap();

        let job = store.claim_next_job().unwrap().unwrap();
        store.complete_job(job.id, &outcome(&job)).unwrap();

        let done = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.result.as_ref().unwrap().output_path, job.output_path);
        assert!(done.failure_reason.is_none());
        assert!(done.completed_at.is_some());
        assert!(done.outcome_consistent());

        // Terminal states admit no further transitions
        assert!(store.complete_job(job.id, &outcome(&job)).is_err());
        assert!(store.fail_job(job.id, "too late").is_err());
    }

    #[test]
    fn test_fail_sets_reason() {
        let store = SqliteQueueStore::in_memory().unwrap();
        store.create_batch(vec![new_job("a.png")]).unwrap();

        let job = store.claim_next_job().unwrap().unwrap();
        store.fail_job(job.id, "decode error").unwrap();

        let failed = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("decode error"));
        assert!(failed.result.is_none());
        assert!(failed.outcome_consistent());
    }

    #[test]
    fn test_transitions_require_active_state() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let batch = store.create_batch(vec![new_job("a.png")]).unwrap();
        let job_id = batch.job_ids[0];

        // Still waiting: no transition skips active
        let job = store.get_job(job_id).unwrap().unwrap();
        assert!(store.complete_job(job_id, &outcome(&job)).is_err());
        assert!(store.fail_job(job_id, "nope").is_err());

        let waiting = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(waiting.state, JobState::Waiting);
    }

    #[test]
    fn test_progress_mutable_only_while_active() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let batch = store.create_batch(vec![new_job("a.png")]).unwrap();
        let job_id = batch.job_ids[0];

        assert!(store.update_progress(job_id, 10.0).is_err());

        let job = store.claim_next_job().unwrap().unwrap();
        store.update_progress(job.id, 50.0).unwrap();
        assert_eq!(store.get_job(job.id).unwrap().unwrap().progress, 50.0);

        store.complete_job(job.id, &outcome(&job)).unwrap();
        assert!(store.update_progress(job.id, 75.0).is_err());
        // Completion pins progress at 100
        assert_eq!(store.get_job(job.id).unwrap().unwrap().progress, 100.0);
    }

    #[test]
    fn test_jobs_for_batch_preserves_order_and_skips_missing() {
        let store = SqliteQueueStore::in_memory().unwrap();
        let batch = store
            .create_batch(vec![new_job("a.png"), new_job("b.png")])
            .unwrap();

        let mut ids = batch.job_ids.clone();
        ids.insert(1, Uuid::new_v4()); // evicted job, excluded from results

        let jobs = store.jobs_for_batch(&ids).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, batch.job_ids[0]);
        assert_eq!(jobs[1].id, batch.job_ids[1]);
    }

    #[test]
    fn test_get_batch_unknown_id() {
        let store = SqliteQueueStore::in_memory().unwrap();
        assert!(store.get_batch(Uuid::new_v4()).unwrap().is_none());
        assert!(store.get_job(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_count_active_jobs() {
        let store = SqliteQueueStore::in_memory().unwrap();
        store
            .create_batch(vec![new_job("a.png"), new_job("b.png")])
            .unwrap();

        assert_eq!(store.count_active_jobs().unwrap(), 0);
        store.claim_next_job().unwrap().unwrap();
        assert_eq!(store.count_active_jobs().unwrap(), 1);
    }
}
