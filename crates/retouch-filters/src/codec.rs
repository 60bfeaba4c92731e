//! Image decoding and encoding.
//!
//! Raw bytes in, [`DynamicImage`] out, and back again. The output
//! format follows the extension of the path the bytes are destined for,
//! so a chain replayed for `photo_filtered.jpg` is written as JPEG.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::types::FilterError;

/// Format used when a path has no recognizable image extension.
pub const FALLBACK_FORMAT: ImageFormat = ImageFormat::Png;

/// Decode raw image bytes.
///
/// Supports whatever the enabled `image` codecs can decode (PNG, JPEG,
/// BMP, WebP, GIF).
///
/// # Errors
///
/// Returns [`FilterError::EmptyInput`] if `bytes` is empty.
/// Returns [`FilterError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, FilterError> {
    if bytes.is_empty() {
        return Err(FilterError::EmptyInput);
    }

    Ok(image::load_from_memory(bytes)?)
}

/// Pick the output format for a storage path from its extension.
///
/// Unknown or missing extensions fall back to [`FALLBACK_FORMAT`].
#[must_use]
pub fn format_for_path(path: &str) -> ImageFormat {
    path.rsplit_once('.')
        .and_then(|(_, ext)| ImageFormat::from_extension(ext))
        .unwrap_or(FALLBACK_FORMAT)
}

/// Encode an image in the given format.
///
/// PNG takes any color type as is. JPEG cannot carry an alpha channel,
/// so images are flattened to RGB first; every other encoder gets RGBA.
///
/// # Errors
///
/// Returns [`FilterError::ImageEncode`] if the encoder rejects the image.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, FilterError> {
    let mut buf = Cursor::new(Vec::new());
    let result = match format {
        ImageFormat::Png => image.write_to(&mut buf, format),
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut buf, format),
        _ => DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut buf, format),
    };
    result.map_err(|e| FilterError::ImageEncode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Read the pixel dimensions of encoded image bytes.
///
/// # Errors
///
/// Same as [`decode`].
pub fn dimensions(bytes: &[u8]) -> Result<(u32, u32), FilterError> {
    let image = decode(bytes)?;
    Ok((image.width(), image.height()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgba8(image::RgbaImage::from_fn(4, 3, |x, y| {
            image::Rgba([u8::try_from(x * 60).unwrap(), u8::try_from(y * 80).unwrap(), 10, 200])
        }))
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(FilterError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        assert!(matches!(
            decode(&[0xFF, 0xFE, 0x00, 0x01]),
            Err(FilterError::ImageDecode(_))
        ));
    }

    #[test]
    fn png_keeps_pixels() {
        let img = sample_image();
        let bytes = encode(&img, ImageFormat::Png).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.to_rgba8(), img.to_rgba8());
    }

    #[test]
    fn jpeg_accepts_rgba_input() {
        let bytes = encode(&sample_image(), ImageFormat::Jpeg).unwrap();
        assert_eq!(dimensions(&bytes).unwrap(), (4, 3));
    }

    #[test]
    fn webp_accepts_grayscale_input() {
        let gray = sample_image().grayscale();
        let bytes = encode(&gray, ImageFormat::WebP).unwrap();
        assert_eq!(dimensions(&bytes).unwrap(), (4, 3));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(format_for_path("/uploads/a_filtered.jpg"), ImageFormat::Jpeg);
        assert_eq!(format_for_path("/uploads/a.JPEG"), ImageFormat::Jpeg);
        assert_eq!(format_for_path("/uploads/a.webp"), ImageFormat::WebP);
        assert_eq!(format_for_path("/uploads/a"), FALLBACK_FORMAT);
        assert_eq!(format_for_path("/uploads/a.txt"), FALLBACK_FORMAT);
    }
}
