//! retouch-filters: Named image filters and chain replay (sans-IO).
//!
//! A derived image is always rebuilt from its root image by replaying
//! the full filter chain:
//! decode -> filter 1 -> filter 2 -> ... -> filter n -> encode.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices. Storage paths, derivation bookkeeping and the AI
//! provider live in `retouch-store` and `retouch-io`.

pub mod blur;
pub mod codec;
pub mod color;
pub mod edge;
pub mod geometry;
pub mod params;
pub mod registry;
pub mod tone;
pub mod types;

pub use image::ImageFormat;
pub use registry::{Filter, FilterRegistry};
pub use types::{
    AI_EDIT_FILTER, AppliedFilter, DynamicImage, FilterError, FilterSpec, ParamValue, Parameters,
    convert_parameters,
};

/// Every filter shipped with this crate, in listing order.
pub(crate) fn builtin_filters() -> Vec<Box<dyn Filter>> {
    vec![
        Box::new(color::Grayscale),
        Box::new(color::Sepia),
        Box::new(color::Invert),
        Box::new(tone::Brightness),
        Box::new(tone::Contrast),
        Box::new(color::Hue),
        Box::new(blur::Blur),
        Box::new(blur::Sharpen),
        Box::new(edge::Edges),
        Box::new(geometry::Resize),
        Box::new(geometry::Rotate),
        Box::new(geometry::Flip),
    ]
}

/// Output of [`render`].
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// Width of the rendered image in pixels.
    pub width: u32,
    /// Height of the rendered image in pixels.
    pub height: u32,
    /// Names of chain entries the registry could not replay.
    pub skipped: Vec<String>,
}

/// Decode `source`, replay `chain` in order and encode as `format`.
///
/// # Errors
///
/// Returns [`FilterError::EmptyInput`] or [`FilterError::ImageDecode`]
/// if `source` is not a decodable image, the first error raised by a
/// filter in the chain, or [`FilterError::ImageEncode`] if the result
/// cannot be written in `format`.
pub fn render(
    registry: &FilterRegistry,
    source: &[u8],
    chain: &[AppliedFilter],
    format: ImageFormat,
) -> Result<Rendered, FilterError> {
    let mut image = codec::decode(source)?;
    let skipped = registry.replay(&mut image, chain)?;
    let bytes = codec::encode(&image, format)?;
    Ok(Rendered {
        bytes,
        width: image.width(),
        height: image.height(),
        skipped,
    })
}
