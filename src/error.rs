use thiserror::Error;

use crate::models::face_job::Rect;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure taxonomy shared by every stage.
///
/// Only the `*Unavailable` variants are worth retrying: stages are written so a
/// re-run produces at most duplicate crops, never partial state.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("rectangle {rect} lies outside the {width}x{height} photo")]
    InvalidRectangle { rect: Rect, width: u32, height: u32 },

    #[error("invalid face key: {0}")]
    InvalidKey(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("malformed job message: {0}")]
    MalformedJob(String),

    #[error("face detection failed: {0}")]
    Detection(String),

    #[error("blob store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("work queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::StoreUnavailable(_) | PipelineError::QueueUnavailable(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::NotFound(_))
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        PipelineError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_failures_are_transient() {
        assert!(PipelineError::StoreUnavailable("timeout".into()).is_transient());
        assert!(PipelineError::QueueUnavailable("closed".into()).is_transient());
        assert!(!PipelineError::NotFound("P1".into()).is_transient());
        assert!(!PipelineError::Decode("garbage".into()).is_transient());
        assert!(!PipelineError::MalformedJob("{}".into()).is_transient());
    }

    #[test]
    fn invalid_rectangle_message_names_bounds() {
        let e = PipelineError::InvalidRectangle {
            rect: Rect::new(900, 10, 20, 20).unwrap(),
            width: 800,
            height: 600,
        };
        assert_eq!(e.to_string(), "rectangle (900, 10, 20, 20) lies outside the 800x600 photo");
    }
}
