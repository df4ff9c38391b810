use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat, RgbImage};

/// A `width`x`height` JPEG with a gradient, so crops are not all one colour.
pub fn jpeg(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Jpeg(90))
        .unwrap();
    Bytes::from(out)
}

/// Bytes that no image decoder accepts.
pub fn corrupted() -> Bytes {
    Bytes::from_static(b"NOT AN IMAGE FILE")
}

/// Decoded dimensions of a stored object.
pub fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}
