//! Application state for the image processing server

use parking_lot::RwLock;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::Config;
use crate::error::Result;
use crate::processing::{ResizePipeline, WorkerPool};
use crate::queue::{BatchCoordinator, QueueStore, SqliteQueueStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: Config,
    /// Queue store, shared with the worker pool
    store: Arc<dyn QueueStore>,
    /// Batch submission and status aggregation
    coordinator: BatchCoordinator,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create application state and start the worker pool.
    ///
    /// Must run inside a tokio runtime; the pool is spawned as a background
    /// task that lives as long as the process.
    pub fn new(config: Config) -> Result<Self> {
        tracing::info!("Initializing application state...");

        fs::create_dir_all(&config.storage.upload_dir)?;
        fs::create_dir_all(&config.storage.processed_dir)?;

        let store: Arc<dyn QueueStore> =
            Arc::new(SqliteQueueStore::new(&config.storage.db_path)?);
        tracing::info!("Queue store ready at {}", config.storage.db_path.display());

        // A worker crash leaves its job active; there is no requeue policy,
        // so make any stranding visible at startup
        let stranded = store.count_active_jobs()?;
        if stranded > 0 {
            tracing::warn!(
                "{} jobs stranded in active state from a previous run",
                stranded
            );
        }

        let wake = Arc::new(Notify::new());
        let coordinator = BatchCoordinator::new(Arc::clone(&store), Arc::clone(&wake));

        let worker_count = config.processing.effective_worker_count();
        let pool = WorkerPool::new(
            Arc::clone(&store),
            Arc::new(ResizePipeline::new(&config.processing)),
            wake,
            worker_count,
            Duration::from_millis(config.queue.poll_interval_ms),
        );
        tokio::spawn(pool.run());
        tracing::info!("Worker pool running with concurrency = {}", worker_count);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                coordinator,
                ready: RwLock::new(true),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the queue store
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.inner.store
    }

    /// Get the batch coordinator
    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.inner.coordinator
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
