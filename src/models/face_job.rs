use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Axis-aligned pixel rectangle. Serialized as `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 4]", into = "[u32; 4]")]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Returns `None` for a rectangle with a zero side.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { x, y, width, height })
    }

    /// Intersects the rectangle with a `bound_w` x `bound_h` image.
    ///
    /// Partially outside rectangles are clamped; `None` means nothing is left.
    pub fn clamp_to(&self, bound_w: u32, bound_h: u32) -> Option<Rect> {
        if self.x >= bound_w || self.y >= bound_h {
            return None;
        }
        // u64 so x + width cannot overflow for rectangles near u32::MAX
        let right = (self.x as u64 + self.width as u64).min(bound_w as u64);
        let bottom = (self.y as u64 + self.height as u64).min(bound_h as u64);
        Rect::new(
            self.x,
            self.y,
            (right - self.x as u64) as u32,
            (bottom - self.y as u64) as u32,
        )
    }

    /// Builds the smallest pixel rectangle covering float corner coordinates.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Rect> {
        let left = x1.max(0.0).floor();
        let top = y1.max(0.0).floor();
        let right = x2.max(0.0).ceil();
        let bottom = y2.max(0.0).ceil();
        if right <= left || bottom <= top {
            return None;
        }
        Rect::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
    }
}

impl TryFrom<[u32; 4]> for Rect {
    type Error = String;

    fn try_from([x, y, w, h]: [u32; 4]) -> std::result::Result<Self, Self::Error> {
        Rect::new(x, y, w, h).ok_or_else(|| format!("rectangle [{x}, {y}, {w}, {h}] has a zero side"))
    }
}

impl From<Rect> for [u32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x, self.y, self.width, self.height)
    }
}

/// One queued extraction: cut `rectangle` out of photo `photo_id`.
///
/// Wire format: `{"object_id": "<photo_id>", "rectangle": [x, y, w, h]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceJob {
    #[serde(rename = "object_id")]
    pub photo_id: String,
    pub rectangle: Rect,
}

impl FaceJob {
    pub fn new(photo_id: impl Into<String>, rectangle: Rect) -> Self {
        Self { photo_id: photo_id.into(), rectangle }
    }

    pub fn to_message(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PipelineError::MalformedJob(e.to_string()))
    }

    pub fn from_message(body: &str) -> Result<Self> {
        let job: FaceJob =
            serde_json::from_str(body).map_err(|e| PipelineError::MalformedJob(e.to_string()))?;
        if job.photo_id.is_empty() {
            return Err(PipelineError::MalformedJob("empty object_id".into()));
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_matches_wire_format() {
        let job = FaceJob::new("P1", Rect::new(10, 20, 50, 60).unwrap());
        let body = job.to_message().unwrap();
        assert_eq!(body, r#"{"object_id":"P1","rectangle":[10,20,50,60]}"#);
        assert_eq!(FaceJob::from_message(&body).unwrap(), job);
    }

    #[test]
    fn message_rejects_bad_rectangles() {
        assert!(FaceJob::from_message(r#"{"object_id":"P1","rectangle":[1,2,0,4]}"#).is_err());
        assert!(FaceJob::from_message(r#"{"object_id":"P1","rectangle":[-1,2,3,4]}"#).is_err());
        assert!(FaceJob::from_message(r#"{"object_id":"P1","rectangle":[1,2,3]}"#).is_err());
        assert!(FaceJob::from_message(r#"{"object_id":"","rectangle":[1,2,3,4]}"#).is_err());
        assert!(FaceJob::from_message("not json").is_err());
    }

    #[test]
    fn clamp_keeps_rectangle_inside_bounds() {
        let r = Rect::new(10, 10, 50, 50).unwrap();
        assert_eq!(r.clamp_to(800, 600), Some(r));
    }

    #[test]
    fn clamp_trims_partial_overlap() {
        let r = Rect::new(780, 590, 50, 50).unwrap();
        assert_eq!(r.clamp_to(800, 600), Rect::new(780, 590, 20, 10));
    }

    #[test]
    fn clamp_rejects_disjoint_rectangle() {
        assert_eq!(Rect::new(800, 0, 10, 10).unwrap().clamp_to(800, 600), None);
        assert_eq!(Rect::new(0, 650, 10, 10).unwrap().clamp_to(800, 600), None);
    }

    #[test]
    fn clamp_survives_huge_extent() {
        let r = Rect::new(5, 5, u32::MAX, u32::MAX).unwrap();
        assert_eq!(r.clamp_to(100, 80), Rect::new(5, 5, 95, 75));
    }

    #[test]
    fn corners_round_outward() {
        assert_eq!(Rect::from_corners(10.4, 20.6, 59.2, 70.1), Rect::new(10, 20, 50, 51));
        assert_eq!(Rect::from_corners(-3.0, -1.0, 4.0, 4.0), Rect::new(0, 0, 4, 4));
        assert_eq!(Rect::from_corners(5.0, 5.0, 5.0, 9.0), None);
    }
}
