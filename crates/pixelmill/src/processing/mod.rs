//! Job execution: the worker pool and the image transformation pipeline

mod processor;
mod worker;

pub use processor::{ImageProcessor, ResizePipeline};
pub use worker::WorkerPool;
