//! Batch submission and status aggregation
//!
//! Batch status is never stored. Every query re-reads the live job states
//! and folds them into an overall status, so the answer cannot drift from
//! the queue under crashes or partial failures.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::queue::store::QueueStore;
use crate::types::{BatchRecord, BatchStatus, JobRecord, JobState, NewJob};

/// Per-state job counts for one batch
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StateCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub active: usize,
    pub waiting: usize,
}

impl StateCounts {
    /// Tally fetched jobs against the batch's fixed total
    pub fn tally(jobs: &[JobRecord], total: usize) -> Self {
        let mut counts = Self {
            total,
            completed: 0,
            failed: 0,
            active: 0,
            waiting: 0,
        };
        for job in jobs {
            match job.state {
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Active => counts.active += 1,
                JobState::Waiting => counts.waiting += 1,
            }
        }
        counts
    }
}

/// Derive the overall batch status from per-job counts
///
/// Pure function; precedence is evaluated in order. `Unknown` should not
/// occur when the counts sum to `total`, but guards against partial fetches.
pub fn derive_status(counts: &StateCounts) -> BatchStatus {
    if counts.failed > 0 && counts.completed + counts.failed == counts.total {
        BatchStatus::CompletedWithErrors
    } else if counts.completed == counts.total {
        BatchStatus::Completed
    } else if counts.active > 0 {
        BatchStatus::Processing
    } else if counts.waiting > 0 {
        BatchStatus::Waiting
    } else {
        BatchStatus::Unknown
    }
}

/// Receipt returned to the caller at submission time
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub batch_id: Uuid,
    pub total_files: usize,
}

/// Point-in-time view of a batch: derived status, counts, and per-job detail
/// in submission order
#[derive(Debug, Clone)]
pub struct BatchStatusReport {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub counts: StateCounts,
    pub created_at: DateTime<Utc>,
    pub jobs: Vec<JobRecord>,
}

/// Creates batches of jobs and computes their aggregate status on demand
pub struct BatchCoordinator {
    store: Arc<dyn QueueStore>,
    wake: Arc<Notify>,
}

impl BatchCoordinator {
    pub fn new(store: Arc<dyn QueueStore>, wake: Arc<Notify>) -> Self {
        Self { store, wake }
    }

    /// Create one batch and one waiting job per input artifact.
    ///
    /// Record persistence and enqueue happen as a single atomic store
    /// operation; idle workers are woken afterwards.
    pub fn submit(&self, files: Vec<NewJob>) -> Result<SubmitReceipt> {
        if files.is_empty() {
            return Err(Error::invalid_input("No images provided"));
        }

        let batch = self.store.create_batch(files)?;
        tracing::info!(
            "Batch {} created with {} jobs",
            batch.id,
            batch.total_files
        );

        for _ in 0..batch.total_files {
            self.wake.notify_one();
        }

        Ok(SubmitReceipt {
            batch_id: batch.id,
            total_files: batch.total_files,
        })
    }

    /// Compute the current status of a batch by reading the live job states
    pub fn status(&self, batch_id: Uuid) -> Result<BatchStatusReport> {
        let batch: BatchRecord = self
            .store
            .get_batch(batch_id)?
            .ok_or_else(|| Error::not_found(format!("Batch {} not found", batch_id)))?;

        let jobs = self.store.jobs_for_batch(&batch.job_ids)?;
        let counts = StateCounts::tally(&jobs, batch.total_files);
        let status = derive_status(&counts);

        Ok(BatchStatusReport {
            batch_id: batch.id,
            status,
            counts,
            created_at: batch.created_at,
            jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::SqliteQueueStore;
    use crate::types::JobOutcome;

    fn counts(total: usize, completed: usize, failed: usize, active: usize, waiting: usize) -> StateCounts {
        StateCounts {
            total,
            completed,
            failed,
            active,
            waiting,
        }
    }

    fn coordinator() -> (BatchCoordinator, Arc<SqliteQueueStore>) {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let coordinator = BatchCoordinator::new(store.clone(), Arc::new(Notify::new()));
        (coordinator, store)
    }

    fn new_job(name: &str) -> NewJob {
        NewJob {
            input_path: format!("uploads/{}", name),
            output_path: format!("processed/processed-{}.jpg", name),
            original_name: name.to_string(),
        }
    }

    #[test]
    fn test_derive_status_precedence() {
        // Every job finished, at least one failed
        assert_eq!(derive_status(&counts(3, 2, 1, 0, 0)), BatchStatus::CompletedWithErrors);
        assert_eq!(derive_status(&counts(3, 0, 3, 0, 0)), BatchStatus::CompletedWithErrors);
        // Every job finished successfully
        assert_eq!(derive_status(&counts(3, 3, 0, 0, 0)), BatchStatus::Completed);
        // Failures present but work still in flight: not terminal yet
        assert_eq!(derive_status(&counts(3, 1, 1, 1, 0)), BatchStatus::Processing);
        assert_eq!(derive_status(&counts(3, 0, 0, 1, 2)), BatchStatus::Processing);
        assert_eq!(derive_status(&counts(3, 0, 1, 0, 2)), BatchStatus::Waiting);
        assert_eq!(derive_status(&counts(3, 0, 0, 0, 3)), BatchStatus::Waiting);
        // Counts don't account for the whole batch (partial fetch)
        assert_eq!(derive_status(&counts(3, 1, 0, 0, 0)), BatchStatus::Unknown);
    }

    #[test]
    fn test_derive_status_is_idempotent() {
        let c = counts(4, 2, 0, 1, 1);
        assert_eq!(derive_status(&c), derive_status(&c));
    }

    #[test]
    fn test_submit_empty_is_invalid_input() {
        let (coordinator, _store) = coordinator();
        let err = coordinator.submit(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_submit_creates_batch_in_waiting_state() {
        let (coordinator, _store) = coordinator();

        let receipt = coordinator
            .submit(vec![new_job("a.png"), new_job("b.png"), new_job("c.png")])
            .unwrap();
        assert_eq!(receipt.total_files, 3);

        let report = coordinator.status(receipt.batch_id).unwrap();
        assert_eq!(report.status, BatchStatus::Waiting);
        assert_eq!(report.counts, counts(3, 0, 0, 0, 3));
        assert_eq!(report.jobs.len(), 3);
        assert_eq!(report.jobs[0].original_name, "a.png");
        assert_eq!(report.jobs[2].original_name, "c.png");
    }

    #[test]
    fn test_status_unknown_batch_is_not_found() {
        let (coordinator, _store) = coordinator();
        let err = coordinator.status(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_status_tracks_job_transitions() {
        let (coordinator, store) = coordinator();
        let receipt = coordinator
            .submit(vec![new_job("a.png"), new_job("b.png"), new_job("c.png")])
            .unwrap();

        // One job claimed: batch is processing
        let first = store.claim_next_job().unwrap().unwrap();
        let report = coordinator.status(receipt.batch_id).unwrap();
        assert_eq!(report.status, BatchStatus::Processing);
        assert_eq!(report.counts.active, 1);
        assert_eq!(report.counts.waiting, 2);

        // 2 complete + 1 failed, all terminal: completed-with-errors
        store
            .complete_job(
                first.id,
                &JobOutcome {
                    original_name: first.original_name.clone(),
                    output_path: first.output_path.clone(),
                },
            )
            .unwrap();
        let second = store.claim_next_job().unwrap().unwrap();
        store
            .complete_job(
                second.id,
                &JobOutcome {
                    original_name: second.original_name.clone(),
                    output_path: second.output_path.clone(),
                },
            )
            .unwrap();
        let third = store.claim_next_job().unwrap().unwrap();
        store.fail_job(third.id, "decode error").unwrap();

        let report = coordinator.status(receipt.batch_id).unwrap();
        assert_eq!(report.status, BatchStatus::CompletedWithErrors);
        assert_eq!(report.counts, counts(3, 2, 1, 0, 0));

        // Querying again with no state change yields the same answer
        let again = coordinator.status(receipt.batch_id).unwrap();
        assert_eq!(again.status, report.status);
        assert_eq!(again.counts, report.counts);
    }

    #[test]
    fn test_all_completed_batch() {
        let (coordinator, store) = coordinator();
        let receipt = coordinator
            .submit(vec![new_job("a.png"), new_job("b.png"), new_job("c.png")])
            .unwrap();

        while let Some(job) = store.claim_next_job().unwrap() {
            store
                .complete_job(
                    job.id,
                    &JobOutcome {
                        original_name: job.original_name.clone(),
                        output_path: job.output_path.clone(),
                    },
                )
                .unwrap();
        }

        let report = coordinator.status(receipt.batch_id).unwrap();
        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(report.counts, counts(3, 3, 0, 0, 0));
    }
}
