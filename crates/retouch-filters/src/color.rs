//! Per-pixel color filters: grayscale, sepia, invert and hue rotation.

use image::DynamicImage;

use crate::params;
use crate::registry::Filter;
use crate::types::{FilterError, Parameters};

/// Luminance grayscale conversion.
///
/// Uses the `image` crate's luma conversion; alpha is kept.
pub struct Grayscale;

impl Filter for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn description(&self) -> &str {
        "Convert the image to shades of gray"
    }

    fn apply(&self, image: &mut DynamicImage, _params: &Parameters) -> Result<(), FilterError> {
        *image = image.grayscale();
        Ok(())
    }
}

/// Classic sepia toning.
///
/// Parameter `intensity` (0.0 to 1.0, default 1.0) blends between the
/// original color (0.0) and full sepia (1.0).
pub struct Sepia;

impl Sepia {
    /// Default blend factor.
    pub const DEFAULT_INTENSITY: f64 = 1.0;
}

impl Filter for Sepia {
    fn name(&self) -> &str {
        "sepia"
    }

    fn description(&self) -> &str {
        "Warm brown toning; intensity 0..1"
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let intensity = params::number(self.name(), params, "intensity", Self::DEFAULT_INTENSITY)?;
        if !(0.0..=1.0).contains(&intensity) {
            return Err(params::invalid(
                self.name(),
                "intensity",
                format!("must be within 0..1, got {intensity}"),
            ));
        }
        let t = intensity as f32;

        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
            let sr = 0.393f32.mul_add(r, 0.769f32.mul_add(g, 0.189 * b));
            let sg = 0.349f32.mul_add(r, 0.686f32.mul_add(g, 0.168 * b));
            let sb = 0.272f32.mul_add(r, 0.534f32.mul_add(g, 0.131 * b));
            pixel.0 = [
                blend_channel(r, sr, t),
                blend_channel(g, sg, t),
                blend_channel(b, sb, t),
                a,
            ];
        }
        *image = DynamicImage::ImageRgba8(rgba);
        Ok(())
    }
}

/// Linear blend from `from` to `to`, clamped to a `u8` channel value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend_channel(from: f32, to: f32, t: f32) -> u8 {
    (to - from).mul_add(t, from).round().clamp(0.0, 255.0) as u8
}

/// Color negative. Alpha is untouched.
pub struct Invert;

impl Filter for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn description(&self) -> &str {
        "Invert every color channel"
    }

    fn apply(&self, image: &mut DynamicImage, _params: &Parameters) -> Result<(), FilterError> {
        image.invert();
        Ok(())
    }
}

/// Hue rotation.
///
/// Parameter `degrees` (default 0) rotates the hue wheel; fractional
/// degrees are rounded.
pub struct Hue;

impl Filter for Hue {
    fn name(&self) -> &str {
        "hue"
    }

    fn description(&self) -> &str {
        "Rotate hues by the given number of degrees"
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let degrees = params::number(self.name(), params, "degrees", 0.0)?;
        let degrees = (degrees.round() % 360.0) as i32;
        if degrees != 0 {
            *image = image.huerotate(degrees);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    fn pixel_image(rgba: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(3, 3, image::Rgba(rgba)))
    }

    fn with(name: &str, value: ParamValue) -> Parameters {
        let mut p = Parameters::new();
        p.insert(name.to_owned(), value);
        p
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let mut img = pixel_image([200, 40, 10, 255]);
        Grayscale.apply(&mut img, &Parameters::new()).unwrap();
        let [r, g, b, a] = img.to_rgba8().get_pixel(1, 1).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(a, 255);
    }

    #[test]
    fn sepia_zero_intensity_is_identity() {
        let mut img = pixel_image([10, 120, 240, 255]);
        let before = img.to_rgba8();
        Sepia
            .apply(&mut img, &with("intensity", ParamValue::Float(0.0)))
            .unwrap();
        assert_eq!(img.to_rgba8(), before);
    }

    #[test]
    fn sepia_warms_gray() {
        let mut img = pixel_image([100, 100, 100, 255]);
        Sepia.apply(&mut img, &Parameters::new()).unwrap();
        let [r, g, b, _] = img.to_rgba8().get_pixel(0, 0).0;
        assert!(r > g && g > b, "expected warm tone, got {r},{g},{b}");
    }

    #[test]
    fn sepia_rejects_out_of_range_intensity() {
        let mut img = pixel_image([100, 100, 100, 255]);
        let err = Sepia
            .apply(&mut img, &with("intensity", ParamValue::Float(2.0)))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidParameter { .. }));
    }

    #[test]
    fn invert_twice_is_identity() {
        let mut img = pixel_image([1, 2, 3, 4]);
        let before = img.to_rgba8();
        Invert.apply(&mut img, &Parameters::new()).unwrap();
        assert_eq!(img.to_rgba8().get_pixel(0, 0).0, [254, 253, 252, 4]);
        Invert.apply(&mut img, &Parameters::new()).unwrap();
        assert_eq!(img.to_rgba8(), before);
    }

    #[test]
    fn hue_zero_degrees_is_identity() {
        let mut img = pixel_image([200, 40, 10, 255]);
        let before = img.to_rgba8();
        Hue.apply(&mut img, &Parameters::new()).unwrap();
        assert_eq!(img.to_rgba8(), before);
    }

    #[test]
    fn hue_rotation_changes_color() {
        let mut img = pixel_image([200, 40, 10, 255]);
        let before = img.to_rgba8();
        Hue.apply(&mut img, &with("degrees", ParamValue::Float(120.0)))
            .unwrap();
        assert_ne!(img.to_rgba8(), before);
    }
}
