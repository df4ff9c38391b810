pub mod codec;
pub mod detect;
pub mod extract;
pub mod ingest;
#[cfg(feature = "facial-recognition")]
pub mod scrfd;

pub use detect::{Detections, Detector, DetectorConfig};
pub use extract::{extract, RetryPolicy};
pub use ingest::{ingest, FanOut};
