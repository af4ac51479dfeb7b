//! Configuration for the image processing service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Artifact and database locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Worker pool and image pipeline configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Queue polling configuration
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum files accepted per submission
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Maximum size of a single uploaded file in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl ServerConfig {
    /// Total body limit for the upload route: all files plus multipart framing
    pub fn max_body_size(&self) -> usize {
        self.max_file_size * self.max_files + 1024 * 1024
    }
}

/// Artifact and database locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for raw uploads
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Directory for transformed outputs
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    /// SQLite database path for the queue store
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            processed_dir: default_processed_dir(),
            db_path: default_db_path(),
        }
    }
}

/// Worker pool and image pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of concurrent workers (default: CPU count - 1, minimum 1)
    pub worker_count: Option<usize>,
    /// Target width of transformed images in pixels
    #[serde(default = "default_resize_width")]
    pub resize_width: u32,
    /// JPEG encoding quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Convert images to grayscale
    #[serde(default = "default_grayscale")]
    pub grayscale: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            resize_width: default_resize_width(),
            jpeg_quality: default_jpeg_quality(),
            grayscale: default_grayscale(),
        }
    }
}

impl ProcessingConfig {
    /// Effective worker pool size
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }
}

/// Queue polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Fallback poll interval for idle workers in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_max_files() -> usize {
    10
}
fn default_max_file_size() -> usize {
    5 * 1024 * 1024 // 5MB
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_processed_dir() -> PathBuf {
    PathBuf::from("processed")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("pixelmill.db")
}
fn default_resize_width() -> u32 {
    512
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_grayscale() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_worker_count_minimum_one() {
        let config = ProcessingConfig {
            worker_count: Some(0),
            ..Default::default()
        };
        assert_eq!(config.effective_worker_count(), 1);
    }

    #[test]
    fn test_effective_worker_count_explicit() {
        let config = ProcessingConfig {
            worker_count: Some(3),
            ..Default::default()
        };
        assert_eq!(config.effective_worker_count(), 3);
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_files, 10);
        assert_eq!(config.processing.resize_width, 512);
        assert_eq!(config.processing.jpeg_quality, 80);
    }
}
