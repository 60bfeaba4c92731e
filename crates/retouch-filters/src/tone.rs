//! Tone filters: brightness and contrast.
//!
//! Both take a `level` multiplier where 1.0 leaves the image unchanged,
//! values above 1.0 strengthen the effect and values between 0.0 and
//! 1.0 weaken it.

use image::DynamicImage;

use crate::params;
use crate::registry::Filter;
use crate::types::{FilterError, Parameters};

/// Default `level` for tone filters (no change).
pub const DEFAULT_LEVEL: f64 = 1.0;

/// Read and validate the `level` parameter.
fn level(filter: &str, params: &Parameters) -> Result<f64, FilterError> {
    let level = params::number(filter, params, "level", DEFAULT_LEVEL)?;
    if level < 0.0 {
        return Err(params::invalid(
            filter,
            "level",
            format!("must not be negative, got {level}"),
        ));
    }
    Ok(level)
}

/// Multiplicative brightness: every color channel is scaled by `level`.
pub struct Brightness;

impl Filter for Brightness {
    fn name(&self) -> &str {
        "brightness"
    }

    fn description(&self) -> &str {
        "Scale brightness; level 1.0 keeps the image unchanged"
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::float_cmp
    )]
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let level = level(self.name(), params)?;
        if level == DEFAULT_LEVEL {
            return Ok(());
        }

        let factor = level as f32;
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            for channel in &mut pixel.0[..3] {
                *channel = (f32::from(*channel) * factor).round().clamp(0.0, 255.0) as u8;
            }
        }
        *image = DynamicImage::ImageRgba8(rgba);
        Ok(())
    }
}

/// Contrast around mid-gray: `level` 2.0 doubles the distance of every
/// channel from the midpoint, 0.0 flattens the image to gray.
pub struct Contrast;

impl Filter for Contrast {
    fn name(&self) -> &str {
        "contrast"
    }

    fn description(&self) -> &str {
        "Scale contrast; level 1.0 keeps the image unchanged"
    }

    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let level = level(self.name(), params)?;
        if level == DEFAULT_LEVEL {
            return Ok(());
        }

        // `adjust_contrast` takes a percentage change.
        let percent = ((level - 1.0) * 100.0) as f32;
        *image = image.adjust_contrast(percent);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    fn gray(value: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([value, value, value, 255]),
        ))
    }

    fn level_param(value: f64) -> Parameters {
        let mut p = Parameters::new();
        p.insert("level".to_owned(), ParamValue::Float(value));
        p
    }

    #[test]
    fn brightness_scales_channels() {
        let mut img = gray(100);
        Brightness.apply(&mut img, &level_param(1.2)).unwrap();
        assert_eq!(img.to_rgba8().get_pixel(0, 0).0, [120, 120, 120, 255]);
    }

    #[test]
    fn brightness_saturates() {
        let mut img = gray(200);
        Brightness.apply(&mut img, &level_param(3.0)).unwrap();
        assert_eq!(img.to_rgba8().get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn brightness_default_is_identity() {
        let mut img = gray(77);
        let before = img.to_rgba8();
        Brightness.apply(&mut img, &Parameters::new()).unwrap();
        assert_eq!(img.to_rgba8(), before);
    }

    #[test]
    fn brightness_accepts_integer_level() {
        let mut img = gray(50);
        let mut p = Parameters::new();
        p.insert("level".to_owned(), ParamValue::Integer(2));
        Brightness.apply(&mut img, &p).unwrap();
        assert_eq!(img.to_rgba8().get_pixel(0, 0).0[0], 100);
    }

    #[test]
    fn negative_level_is_rejected() {
        let mut img = gray(50);
        assert!(matches!(
            Contrast.apply(&mut img, &level_param(-1.0)),
            Err(FilterError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn contrast_spreads_values() {
        let mut img = DynamicImage::ImageRgba8(image::RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([100, 100, 100, 255])
            } else {
                image::Rgba([160, 160, 160, 255])
            }
        }));
        Contrast.apply(&mut img, &level_param(1.5)).unwrap();
        let rgba = img.to_rgba8();
        let dark = rgba.get_pixel(0, 0).0[0];
        let light = rgba.get_pixel(1, 0).0[0];
        assert!(dark < 100, "dark side should get darker, got {dark}");
        assert!(light > 160, "light side should get lighter, got {light}");
    }
}
