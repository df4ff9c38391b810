pub mod face_job;
pub mod face_key;

pub use face_job::{FaceJob, Rect};
pub use face_key::{FaceKey, Label};
