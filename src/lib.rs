pub mod utils;
pub mod error;
pub mod stats;
pub mod models;
pub mod store;
pub mod queue;
pub mod pipeline;
pub mod labeling;
pub mod api;

use std::sync::Arc;

use pipeline::codec::DEFAULT_JPEG_QUALITY;
use pipeline::detect::Detector;
use queue::WorkQueue;
use store::BlobStore;

/// Handles every stage runs against. Built once by the caller and passed in;
/// stages keep no state of their own between invocations.
#[derive(Clone)]
pub struct AppState {
    pub photos: Arc<dyn BlobStore>,
    pub faces: Arc<dyn BlobStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub detector: Arc<dyn Detector>,
    pub stats: Arc<stats::Stats>,
    pub jpeg_quality: u8,
}

impl AppState {
    pub fn new(
        photos: Arc<dyn BlobStore>,
        faces: Arc<dyn BlobStore>,
        queue: Arc<dyn WorkQueue>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        Self {
            photos,
            faces,
            queue,
            detector,
            stats: Arc::new(stats::Stats::new()),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}
