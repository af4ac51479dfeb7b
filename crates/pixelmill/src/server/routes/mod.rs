//! API routes for the image processing server

pub mod batches;
pub mod jobs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_body_size: usize) -> Router<AppState> {
    Router::new()
        // Submission - with larger body limit for multipart uploads
        .route(
            "/process-images",
            post(batches::process_images).layer(DefaultBodyLimit::max(max_body_size)),
        )
        // Status polling
        .route("/batches/:batch_id", get(batches::get_batch_status))
        .route("/jobs/:job_id", get(jobs::get_job_status))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "pixelmill",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Async image processing with batched jobs and status polling",
        "endpoints": {
            "POST /process-images": "Upload up to 10 images for async processing",
            "GET /batches/:batchId": "Get aggregate batch status and per-file detail",
            "GET /jobs/:jobId": "Get single job status",
        }
    }))
}
