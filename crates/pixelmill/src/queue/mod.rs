//! Job queue core: the persistent queue store and batch coordination

pub mod batch;
pub mod store;

pub use batch::{derive_status, BatchCoordinator, BatchStatusReport, StateCounts, SubmitReceipt};
pub use store::{QueueStore, SqliteQueueStore};
