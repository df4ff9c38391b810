use image::DynamicImage;

use crate::error::Result;
use crate::models::Rect;

/// Face candidates for one image: finite, consumed once, order unspecified.
pub type Detections<'a> = Box<dyn Iterator<Item = Rect> + Send + 'a>;

/// Black-box face detector.
///
/// Best effort: missed faces and non-face rectangles are normal output, not
/// errors. An `Err` means the backend itself failed.
pub trait Detector: Send + Sync {
    fn detect<'a>(&'a self, image: &'a DynamicImage) -> Result<Detections<'a>>;
}

/// Recall / false-positive trade-offs, read from configuration so a deployment
/// can recalibrate without a rebuild.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Overlapping candidates a face needs besides itself to be accepted.
    pub min_neighbors: usize,
    /// Smallest accepted face side, in source pixels.
    pub min_face_size: u32,
    /// Per-candidate score threshold.
    pub confidence: f32,
    /// Candidates overlapping more than this are merged into one face.
    pub nms_iou: f32,
    /// Square inference resolution; multiple of 32.
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_neighbors: 0,
            min_face_size: 30,
            confidence: 0.5,
            nms_iou: 0.4,
            input_size: 640,
        }
    }
}

impl DetectorConfig {
    /// Rounds `input_size` to a usable multiple of 32 (at least 32).
    pub fn normalized(mut self) -> Self {
        self.input_size = (self.input_size.max(32) / 32) * 32;
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.nms_iou = self.nms_iou.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rounds_input_size() {
        let cfg = DetectorConfig { input_size: 650, ..Default::default() }.normalized();
        assert_eq!(cfg.input_size, 640);
        let cfg = DetectorConfig { input_size: 3, confidence: 2.0, ..Default::default() }.normalized();
        assert_eq!(cfg.input_size, 32);
        assert_eq!(cfg.confidence, 1.0);
    }
}
