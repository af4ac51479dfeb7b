//! Image processing server binary
//!
//! Run with: cargo run -p pixelmill --bin pixelmill-server

use pixelmill::{config::Config, server::Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelmill=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration (PIXELMILL_CONFIG points at a TOML file, else defaults)
    let config = match std::env::var("PIXELMILL_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Upload dir: {}", config.storage.upload_dir.display());
    tracing::info!("  - Processed dir: {}", config.storage.processed_dir.display());
    tracing::info!("  - Queue store: {}", config.storage.db_path.display());
    tracing::info!("  - Workers: {}", config.processing.effective_worker_count());
    tracing::info!(
        "  - Pipeline: resize to {}px, grayscale: {}, jpeg quality {}",
        config.processing.resize_width,
        config.processing.grayscale,
        config.processing.jpeg_quality
    );

    let server = Server::new(config)?;

    println!("API running on http://{}", server.address());
    println!("  POST /process-images   - Upload images");
    println!("  GET  /batches/:batchId - Poll batch status");
    println!("  GET  /jobs/:jobId      - Poll single job");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
