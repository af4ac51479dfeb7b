//! Batch submission and status endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::queue::StateCounts;
use crate::server::state::AppState;
use crate::types::{BatchStatus, JobOutcome, JobState, NewJob};

/// Response from batch submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub batch_id: Uuid,
    pub status_url: String,
    pub total_files: usize,
}

/// POST /process-images - Upload images for async processing
pub async fn process_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let config = state.config().clone();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        Error::invalid_input(format!("Failed to read multipart field: {}", e))
    })? {
        // Only file fields count as submitted artifacts
        let Some(original_name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        if files.len() >= config.server.max_files {
            return Err(Error::invalid_input(format!(
                "At most {} files per submission",
                config.server.max_files
            )));
        }

        let data = field.bytes().await.map_err(|e| {
            Error::invalid_input(format!("Failed to read file '{}': {}", original_name, e))
        })?;

        if data.len() > config.server.max_file_size {
            return Err(Error::invalid_input(format!(
                "File '{}' exceeds the {} byte limit",
                original_name, config.server.max_file_size
            )));
        }

        // Uploads are stored under an opaque name; the display name travels
        // on the job record
        let stored_name = Uuid::new_v4().simple().to_string();
        let input_path = config.storage.upload_dir.join(&stored_name);
        tokio::fs::write(&input_path, &data).await.map_err(|e| {
            Error::internal(format!("Failed to store upload '{}': {}", original_name, e))
        })?;

        let output_path = config
            .storage
            .processed_dir
            .join(format!("processed-{}.jpg", stored_name));

        tracing::info!("Queued file: {} ({} bytes)", original_name, data.len());
        files.push(NewJob {
            input_path: input_path.to_string_lossy().into_owned(),
            output_path: output_path.to_string_lossy().into_owned(),
            original_name,
        });
    }

    let receipt = state.coordinator().submit(files)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            batch_id: receipt.batch_id,
            status_url: format!("/batches/{}", receipt.batch_id),
            total_files: receipt.total_files,
        }),
    ))
}

/// GET /batches/:batch_id - Get aggregate batch status
pub async fn get_batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchStatusResponse>> {
    let report = state.coordinator().status(batch_id)?;

    let files = report
        .jobs
        .iter()
        .map(|job| BatchFileResponse {
            job_id: job.id,
            original_name: job.original_name.clone(),
            state: job.state,
            result: job.result.clone(),
            failed_reason: job.failure_reason.clone(),
        })
        .collect();

    Ok(Json(BatchStatusResponse {
        batch_id: report.batch_id,
        status: report.status,
        progress: report.counts,
        created_at: report.created_at.to_rfc3339(),
        files,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusResponse {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub progress: StateCounts,
    pub created_at: String,
    pub files: Vec<BatchFileResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFileResponse {
    pub job_id: Uuid,
    pub original_name: String,
    pub state: JobState,
    /// Success payload, or null until the job completes
    pub result: Option<JobOutcome>,
    /// Failure cause, or null unless the job failed
    pub failed_reason: Option<String>,
}
