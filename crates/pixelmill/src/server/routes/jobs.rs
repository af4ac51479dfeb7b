//! Single job status endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{JobOutcome, JobState};

/// GET /jobs/:job_id - Get single job status
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>> {
    let job = state
        .store()
        .get_job(job_id)?
        .ok_or_else(|| Error::not_found(format!("Job {} not found", job_id)))?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        state: job.state,
        progress: job.progress,
        result: job.result,
        failed_reason: job.failure_reason,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress: f32,
    pub result: Option<JobOutcome>,
    pub failed_reason: Option<String>,
}
