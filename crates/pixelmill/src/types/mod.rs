//! Core types for the image processing service

pub mod batch;
pub mod job;

pub use batch::{BatchRecord, BatchStatus};
pub use job::{JobOutcome, JobRecord, JobState, NewJob};
