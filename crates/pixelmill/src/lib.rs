//! pixelmill: async image processing service with batched jobs
//!
//! Accepts batches of images over HTTP, enqueues each as an independently
//! schedulable job in a persistent SQLite-backed queue, processes jobs with
//! a bounded worker pool, and serves per-job and aggregate batch status
//! derived live from the job states.

pub mod config;
pub mod error;
pub mod processing;
pub mod queue;
pub mod server;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{
    batch::{BatchRecord, BatchStatus},
    job::{JobOutcome, JobRecord, JobState, NewJob},
};
