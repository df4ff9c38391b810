use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::{DetectorConfig, RetryPolicy};

#[derive(Clone, Debug)]
pub struct Config {
    pub data: PathBuf,
    pub port: u16,
    pub photos_bucket: String,
    pub faces_bucket: String,
    pub extract_threads: usize,
    pub extract_retry: RetryPolicy,
    pub queue_capacity: usize,
    pub store_timeout: Duration,
    pub queue_timeout: Duration,
    pub jpeg_quality: u8,
    pub detector: DetectorConfig,
    pub models: PathBuf,
    pub auto_download: bool,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match env::var(key).map(|v| v.trim().to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let data = PathBuf::from(env::var("FACETAG_DATA").unwrap_or_else(|_| "/facetag-data".to_string()));
        let models = env::var("FACETAG_MODELS").map(PathBuf::from).unwrap_or_else(|_| data.join("models"));
        let defaults = DetectorConfig::default();
        let detector = DetectorConfig {
            min_neighbors: parsed("FACETAG_MIN_NEIGHBORS", defaults.min_neighbors),
            min_face_size: parsed("FACETAG_MIN_FACE_SIZE", defaults.min_face_size),
            confidence: parsed("FACETAG_CONFIDENCE", defaults.confidence),
            nms_iou: parsed("FACETAG_NMS_IOU", defaults.nms_iou),
            input_size: parsed("FACETAG_INPUT_SIZE", defaults.input_size),
        }
        .normalized();
        Self {
            port: parsed("FACETAG_PORT", 9170),
            photos_bucket: env::var("FACETAG_PHOTOS_BUCKET").unwrap_or_else(|_| "photos".to_string()),
            faces_bucket: env::var("FACETAG_FACES_BUCKET").unwrap_or_else(|_| "faces".to_string()),
            extract_threads: parsed("FACETAG_EXTRACT_THREADS", 2usize).max(1),
            extract_retry: RetryPolicy {
                max_attempts: parsed("FACETAG_EXTRACT_ATTEMPTS", 5u32).max(1),
                backoff: Duration::from_millis(parsed("FACETAG_RETRY_BACKOFF_MS", 500)),
            },
            queue_capacity: parsed("FACETAG_QUEUE_CAPACITY", 4096usize).max(1),
            store_timeout: Duration::from_millis(parsed("FACETAG_STORE_TIMEOUT_MS", 10_000)),
            queue_timeout: Duration::from_millis(parsed("FACETAG_QUEUE_TIMEOUT_MS", 5_000)),
            jpeg_quality: parsed("FACETAG_JPEG_QUALITY", 90u8).clamp(1, 100),
            detector,
            models,
            auto_download: flag("FACETAG_AUTO_DOWNLOAD", true),
            data,
        }
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.data.join(&self.photos_bucket)
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.data.join(&self.faces_bucket)
    }
}
