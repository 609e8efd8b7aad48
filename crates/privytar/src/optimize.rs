//! Image recompression

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

use crate::error::FetchError;

/// Re-encode `original` as a baseline JPEG at `quality`.
///
/// Images with an alpha channel are flattened onto white first, since JPEG
/// has no transparency.
pub fn recompress(original: &[u8], quality: u8) -> Result<Vec<u8>, FetchError> {
    let decoded =
        image::load_from_memory(original).map_err(|e| FetchError::Decode(e.to_string()))?;

    let rgb = if decoded.color().has_alpha() {
        flatten_on_white(&decoded)
    } else {
        decoded.to_rgb8()
    };

    let mut encoded = Vec::with_capacity(original.len());
    let encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
    DynamicImage::ImageRgb8(rgb)
        .write_with_encoder(encoder)
        .map_err(|e| FetchError::Optimize(e.to_string()))?;

    Ok(encoded)
}

/// Recompress once and keep whichever representation is smaller.
///
/// The optimized candidate must be strictly smaller than the bytes actually
/// received; ties keep the original.
pub fn smaller_of(original: Bytes, quality: u8) -> Result<Bytes, FetchError> {
    let candidate = recompress(&original, quality)?;

    if candidate.len() < original.len() {
        Ok(Bytes::from(candidate))
    } else {
        Ok(original)
    }
}

fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
