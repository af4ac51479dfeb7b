//! Job entity and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle state
///
/// Legal transitions: `Waiting -> Active -> Completed` or
/// `Waiting -> Active -> Failed`. Terminal states never transition again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// Stable string form used in the queue store
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobState::Waiting),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    /// Whether the state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Success payload recorded when a job completes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub original_name: String,
    pub output_path: String,
}

/// Creation payload for a job: the artifact references and display name
#[derive(Debug, Clone)]
pub struct NewJob {
    pub input_path: String,
    pub output_path: String,
    pub original_name: String,
}

/// A unit of work: one input artifact with its own lifecycle
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub input_path: String,
    pub output_path: String,
    pub original_name: String,
    pub state: JobState,
    /// Present only when `state == Completed`
    pub result: Option<JobOutcome>,
    /// Present only when `state == Failed`
    pub failure_reason: Option<String>,
    /// Mutable only while `Active`
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Invariant check: at most one of result/failure_reason is set, and
    /// whichever is set matches the state.
    pub fn outcome_consistent(&self) -> bool {
        match self.state {
            JobState::Completed => self.result.is_some() && self.failure_reason.is_none(),
            JobState::Failed => self.failure_reason.is_some() && self.result.is_none(),
            JobState::Waiting | JobState::Active => {
                self.result.is_none() && self.failure_reason.is_none()
            }
        }
    }
}
