//! Canny edge detection as an image filter.
//!
//! Wraps [`imageproc::edges::canny`] on the luma channel. The result is
//! a black image with white edge lines, stored as RGBA so later filters
//! in a chain see an ordinary color image.

use image::{DynamicImage, GrayImage};

use crate::params;
use crate::registry::Filter;
use crate::types::{FilterError, Parameters};

/// Minimum allowed Canny threshold.
///
/// A low threshold of zero marks every pixel with any gradient as a
/// potential edge, which turns noisy photos into solid white.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Detect edges using the Canny algorithm.
///
/// Returns a binary image: 255 for edge pixels, 0 for non-edge.
///
/// Both thresholds are clamped to a minimum of [`MIN_THRESHOLD`] and
/// `low_threshold` is clamped to be at most `high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);
    imageproc::edges::canny(image, low, high)
}

/// Edge map filter. Parameters `low` (default 50) and `high`
/// (default 150) are the hysteresis thresholds.
pub struct Edges;

impl Edges {
    /// Default low hysteresis threshold.
    pub const DEFAULT_LOW: f64 = 50.0;
    /// Default high hysteresis threshold.
    pub const DEFAULT_HIGH: f64 = 150.0;
}

impl Filter for Edges {
    fn name(&self) -> &str {
        "edges"
    }

    fn description(&self) -> &str {
        "Canny edge map; low and high set the hysteresis thresholds"
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let low = params::number(self.name(), params, "low", Self::DEFAULT_LOW)? as f32;
        let high = params::number(self.name(), params, "high", Self::DEFAULT_HIGH)? as f32;
        let edges = canny(&image.to_luma8(), low, high);
        *image = DynamicImage::ImageRgba8(DynamicImage::ImageLuma8(edges).to_rgba8());
        Ok(())
    }
}
