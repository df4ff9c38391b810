use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat};

use crate::error::{PipelineError, Result};
use crate::models::Rect;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| PipelineError::Decode(e.to_string()))
}

/// Re-encodes as baseline JPEG. Alpha is dropped; JPEG has no channel for it.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(quality.clamp(1, 100)))
        .map_err(|e| PipelineError::Decode(format!("jpeg encode failed: {e}")))?;
    Ok(buf)
}

/// Cuts `rect` out of `image`, clamping it to the image bounds first.
pub fn crop(image: &DynamicImage, rect: Rect) -> Result<DynamicImage> {
    let (w, h) = (image.width(), image.height());
    let r = rect.clamp_to(w, h).ok_or(PipelineError::InvalidRectangle {
        rect,
        width: w,
        height: h,
    })?;
    Ok(image.crop_imm(r.x, r.y, r.width, r.height))
}
