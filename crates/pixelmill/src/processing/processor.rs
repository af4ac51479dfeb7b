//! Image transformation pipeline
//!
//! The transform either fully produces the output artifact or fails without
//! leaving a partial file behind: encoding goes to a temp file in the
//! destination directory which is atomically persisted on success.

use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImageView};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::types::{JobOutcome, JobRecord};

/// The processing operation invoked by the worker pool for each claimed job
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Transform the job's input artifact into its output artifact
    async fn process(&self, job: &JobRecord) -> Result<JobOutcome>;
}

/// Resize + grayscale + JPEG re-encode pipeline
pub struct ResizePipeline {
    width: u32,
    quality: u8,
    grayscale: bool,
}

impl ResizePipeline {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            width: config.resize_width,
            quality: config.jpeg_quality,
            grayscale: config.grayscale,
        }
    }
}

#[async_trait]
impl ImageProcessor for ResizePipeline {
    async fn process(&self, job: &JobRecord) -> Result<JobOutcome> {
        let input = PathBuf::from(&job.input_path);
        let output = PathBuf::from(&job.output_path);
        let original_name = job.original_name.clone();
        let width = self.width;
        let quality = self.quality;
        let grayscale = self.grayscale;

        // Decode and encode are CPU-bound; keep them off the async executor
        tokio::task::spawn_blocking(move || {
            transform(&input, &output, &original_name, width, quality, grayscale)
        })
        .await
        .map_err(|e| Error::internal(format!("Processing task panicked: {}", e)))??;

        Ok(JobOutcome {
            original_name: job.original_name.clone(),
            output_path: job.output_path.clone(),
        })
    }
}

fn transform(
    input: &Path,
    output: &Path,
    original_name: &str,
    width: u32,
    quality: u8,
    grayscale: bool,
) -> Result<()> {
    let img = image::open(input)
        .map_err(|e| Error::processing(format!("Failed to decode '{}': {}", original_name, e)))?;

    let (w, h) = img.dimensions();
    let target_height = ((h as u64 * width as u64) / w.max(1) as u64).max(1) as u32;
    let img = img.resize_exact(width, target_height, FilterType::Triangle);

    // JPEG supports L8 and Rgb8; normalize before encoding
    let img = if grayscale {
        DynamicImage::ImageLuma8(img.to_luma8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        Error::processing(format!(
            "Failed to create temp output for '{}': {}",
            original_name, e
        ))
    })?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
        img.write_with_encoder(encoder).map_err(|e| {
            Error::processing(format!("Failed to encode '{}': {}", original_name, e))
        })?;
        writer.flush()?;
    }

    tmp.persist(output).map_err(|e| {
        Error::processing(format!(
            "Failed to persist output for '{}': {}",
            original_name, e.error
        ))
    })?;

    Ok(())
}
