//! Batch entity and derived status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fixed group of jobs submitted together
///
/// The record itself is never mutated after creation; its overall status is
/// always derived from the live job states, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: Uuid,
    /// Job ids in submission order, fixed at creation
    pub job_ids: Vec<Uuid>,
    pub total_files: usize,
    pub created_at: DateTime<Utc>,
}

impl BatchRecord {
    pub fn new(job_ids: Vec<Uuid>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            total_files: job_ids.len(),
            job_ids,
            created_at,
        }
    }
}

/// Overall batch status, derived from per-job state counts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BatchStatus {
    Waiting,
    Processing,
    Completed,
    CompletedWithErrors,
    /// Defensive fallback; guards against partial fetches or a counting bug
    Unknown,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Waiting => "waiting",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::CompletedWithErrors => "completed-with-errors",
            BatchStatus::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_total_matches_job_ids() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let batch = BatchRecord::new(ids.clone(), Utc::now());
        assert_eq!(batch.total_files, 3);
        assert_eq!(batch.job_ids, ids);
    }

    #[test]
    fn test_status_wire_form() {
        assert_eq!(
            serde_json::to_string(&BatchStatus::CompletedWithErrors).unwrap(),
            "\"completed-with-errors\""
        );
        assert_eq!(serde_json::to_string(&BatchStatus::Waiting).unwrap(), "\"waiting\"");
    }
}
