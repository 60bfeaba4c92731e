//! Gaussian blur and unsharp-mask sharpening.

use image::DynamicImage;

use crate::params;
use crate::registry::Filter;
use crate::types::{FilterError, Parameters};

/// Largest accepted `sigma` for [`Blur`] and [`Sharpen`].
///
/// Kernel size grows linearly with sigma; beyond this the kernel is
/// wider than any image a filter is expected to see.
pub const MAX_SIGMA: f64 = 256.0;

/// Read `sigma` and reject values the kernel cannot be built from.
///
/// Non-positive values pass through; each filter decides what they
/// mean.
#[allow(clippy::cast_possible_truncation)]
fn sigma(filter: &str, params: &Parameters, default: f64) -> Result<f32, FilterError> {
    let value = params::number(filter, params, "sigma", default)?;
    let narrowed = value as f32;
    if !value.is_finite() || value > MAX_SIGMA || !narrowed.is_finite() {
        return Err(params::invalid(
            filter,
            "sigma",
            format!("must be at most {MAX_SIGMA}, got {value}"),
        ));
    }
    Ok(narrowed)
}

/// Gaussian blur. Parameter `sigma` (default 1.4, at most
/// [`MAX_SIGMA`]); higher values blur more, non-positive values leave
/// the image unchanged.
pub struct Blur;

impl Blur {
    /// Default kernel sigma.
    pub const DEFAULT_SIGMA: f64 = 1.4;
}

impl Filter for Blur {
    fn name(&self) -> &str {
        "blur"
    }

    fn description(&self) -> &str {
        "Gaussian blur; sigma controls the radius"
    }

    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let sigma = sigma(self.name(), params, Self::DEFAULT_SIGMA)?;
        if sigma <= 0.0 {
            return Ok(());
        }
        // imageproc panics on sigma <= 0, checked above.
        let blurred = imageproc::filter::gaussian_blur_f32(&image.to_rgba8(), sigma);
        *image = DynamicImage::ImageRgba8(blurred);
        Ok(())
    }
}

/// Unsharp mask. Parameters `sigma` (default 1.0, within
/// `0 < sigma <= MAX_SIGMA`) and `threshold` (default 1, minimum
/// brightness difference to sharpen, 0..=255).
pub struct Sharpen;

impl Sharpen {
    /// Default blur sigma of the unsharp mask.
    pub const DEFAULT_SIGMA: f64 = 1.0;
    /// Default difference threshold.
    pub const DEFAULT_THRESHOLD: f64 = 1.0;
    /// Largest meaningful threshold for 8-bit channels.
    pub const MAX_THRESHOLD: f64 = 255.0;
}

impl Filter for Sharpen {
    fn name(&self) -> &str {
        "sharpen"
    }

    fn description(&self) -> &str {
        "Unsharp mask; sigma sets the radius, threshold the minimum contrast"
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let sigma = sigma(self.name(), params, Self::DEFAULT_SIGMA)?;
        if sigma <= 0.0 {
            return Err(params::invalid(
                self.name(),
                "sigma",
                format!("must be positive, got {sigma}"),
            ));
        }
        let threshold = params::number(self.name(), params, "threshold", Self::DEFAULT_THRESHOLD)?;
        if !(0.0..=Self::MAX_THRESHOLD).contains(&threshold) {
            return Err(params::invalid(
                self.name(),
                "threshold",
                format!("must be within 0..={}, got {threshold}", Self::MAX_THRESHOLD),
            ));
        }
        *image = image.unsharpen(sigma, threshold.round() as i32);
        Ok(())
    }
}
