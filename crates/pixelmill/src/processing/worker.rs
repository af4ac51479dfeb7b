//! Worker pool that claims and executes queued jobs

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::queue::store::QueueStore;
use crate::types::JobRecord;

use super::processor::ImageProcessor;

/// Fixed-size pool of concurrent executors
///
/// Each worker independently claims the next waiting job from the store,
/// invokes the processing operation, and records the outcome. The atomic
/// claim guarantees no job is executed by more than one worker.
pub struct WorkerPool {
    store: Arc<dyn QueueStore>,
    processor: Arc<dyn ImageProcessor>,
    wake: Arc<Notify>,
    worker_count: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn QueueStore>,
        processor: Arc<dyn ImageProcessor>,
        wake: Arc<Notify>,
        worker_count: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            wake,
            worker_count: worker_count.max(1),
            poll_interval,
        }
    }

    /// Run all workers until the pool task is dropped or aborted
    pub async fn run(self) {
        tracing::info!("Worker pool started with concurrency = {}", self.worker_count);

        let handles: Vec<_> = (0..self.worker_count)
            .map(|worker_id| {
                let store = Arc::clone(&self.store);
                let processor = Arc::clone(&self.processor);
                let wake = Arc::clone(&self.wake);
                let poll_interval = self.poll_interval;

                tokio::spawn(async move {
                    worker_loop(worker_id, store, processor, wake, poll_interval).await;
                })
            })
            .collect();

        join_all(handles).await;
    }
}

async fn worker_loop(
    worker_id: usize,
    store: Arc<dyn QueueStore>,
    processor: Arc<dyn ImageProcessor>,
    wake: Arc<Notify>,
    poll_interval: Duration,
) {
    loop {
        match store.claim_next_job() {
            Ok(Some(job)) => {
                execute_job(worker_id, &store, &processor, job).await;
            }
            Ok(None) => {
                // Nothing waiting: sleep until a submission wakes us, with a
                // poll fallback so jobs persisted before startup get picked up
                tokio::select! {
                    _ = wake.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                tracing::error!("Worker {} failed to claim a job: {}", worker_id, e);
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

/// Process one claimed job and record its terminal state.
///
/// A failure here is isolated to this job; sibling jobs in the same batch
/// keep processing.
async fn execute_job(
    worker_id: usize,
    store: &Arc<dyn QueueStore>,
    processor: &Arc<dyn ImageProcessor>,
    job: JobRecord,
) {
    tracing::info!(
        "Worker {} processing job {} ({})",
        worker_id,
        job.id,
        job.original_name
    );

    match processor.process(&job).await {
        Ok(outcome) => {
            if let Err(e) = store.complete_job(job.id, &outcome) {
                tracing::error!("Failed to record completion of job {}: {}", job.id, e);
                return;
            }
            tracing::info!("Completed: {} -> {}", job.original_name, outcome.output_path);
        }
        Err(e) => {
            let reason = e.to_string();
            tracing::warn!("Job {} failed: {}", job.id, reason);
            if let Err(e) = store.fail_job(job.id, &reason) {
                tracing::error!("Failed to record failure of job {}: {}", job.id, e);
            }
        }
    }
}
