//! Geometric filters: resize, rotate and flip.

use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use image::imageops::FilterType;

use crate::params;
use crate::registry::Filter;
use crate::types::{FilterError, Parameters};

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resample {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl Resample {
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for Resample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("nearest"),
            Self::Triangle => f.write_str("triangle"),
            Self::CatmullRom => f.write_str("catmullrom"),
            Self::Gaussian => f.write_str("gaussian"),
            Self::Lanczos3 => f.write_str("lanczos3"),
        }
    }
}

impl FromStr for Resample {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "triangle" | "bilinear" => Ok(Self::Triangle),
            "catmullrom" | "bicubic" => Ok(Self::CatmullRom),
            "gaussian" => Ok(Self::Gaussian),
            "lanczos3" | "lanczos" => Ok(Self::Lanczos3),
            other => Err(format!("unknown resampling filter {other:?}")),
        }
    }
}

/// Resize to exact or proportional dimensions.
///
/// Parameters:
/// - `scale`: uniform factor applied to both axes; wins over explicit sizes.
/// - `width` / `height`: target size in pixels. When only one is given
///   the other follows the aspect ratio.
/// - `filter`: resampling filter name (default `triangle`).
///
/// With none of `scale`, `width` or `height` the image is unchanged.
pub struct Resize;

impl Resize {
    /// Largest accepted output side, in pixels.
    pub const MAX_SIDE: u32 = 16_384;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn target(&self, w: u32, h: u32, params: &Parameters) -> Result<Option<(u32, u32)>, FilterError> {
        let side = |name: &str, value: f64| -> Result<u32, FilterError> {
            let rounded = value.round();
            if rounded < 1.0 || rounded > f64::from(Self::MAX_SIDE) {
                return Err(params::invalid(
                    self.name(),
                    name,
                    format!("must be within 1..={}, got {value}", Self::MAX_SIDE),
                ));
            }
            Ok(rounded as u32)
        };

        if let Some(scale) = params::optional_number(self.name(), params, "scale")? {
            if scale <= 0.0 {
                return Err(params::invalid(
                    self.name(),
                    "scale",
                    format!("must be positive, got {scale}"),
                ));
            }
            return Ok(Some((
                side("scale", f64::from(w) * scale)?,
                side("scale", f64::from(h) * scale)?,
            )));
        }

        let width = params::optional_number(self.name(), params, "width")?;
        let height = params::optional_number(self.name(), params, "height")?;
        let aspect = f64::from(w) / f64::from(h.max(1));
        let target = match (width, height) {
            (None, None) => return Ok(None),
            (Some(tw), Some(th)) => (side("width", tw)?, side("height", th)?),
            (Some(tw), None) => {
                let tw = side("width", tw)?;
                (tw, side("height", (f64::from(tw) / aspect).max(1.0))?)
            }
            (None, Some(th)) => {
                let th = side("height", th)?;
                (side("width", (f64::from(th) * aspect).max(1.0))?, th)
            }
        };
        Ok(Some(target))
    }
}

impl Filter for Resize {
    fn name(&self) -> &str {
        "resize"
    }

    fn description(&self) -> &str {
        "Resize by scale or to width/height; filter picks the resampling kernel"
    }

    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let resample: Resample = params::text(params, "filter", "triangle")
            .parse()
            .map_err(|reason| params::invalid(self.name(), "filter", reason))?;
        let Some((w, h)) = self.target(image.width(), image.height(), params)? else {
            return Ok(());
        };
        if (w, h) != (image.width(), image.height()) {
            *image = image.resize_exact(w, h, resample.to_image_filter());
        }
        Ok(())
    }
}

/// Clockwise rotation by a multiple of 90 degrees.
///
/// Parameter `degrees` (default 90) must be a multiple of 90; negative
/// values rotate counter-clockwise.
pub struct Rotate;

impl Filter for Rotate {
    fn name(&self) -> &str {
        "rotate"
    }

    fn description(&self) -> &str {
        "Rotate clockwise by 90, 180 or 270 degrees"
    }

    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let degrees = params::number(self.name(), params, "degrees", 90.0)?;
        let quarter = degrees / 90.0;
        if quarter.fract() != 0.0 || !quarter.is_finite() {
            return Err(params::invalid(
                self.name(),
                "degrees",
                format!("must be a multiple of 90, got {degrees}"),
            ));
        }
        *image = match (quarter as i64).rem_euclid(4) {
            1 => image.rotate90(),
            2 => image.rotate180(),
            3 => image.rotate270(),
            _ => return Ok(()),
        };
        Ok(())
    }
}

/// Mirror the image. Parameter `direction` is `horizontal` (default,
/// left-right mirror) or `vertical` (upside down).
pub struct Flip;

impl Filter for Flip {
    fn name(&self) -> &str {
        "flip"
    }

    fn description(&self) -> &str {
        "Mirror horizontally or vertically"
    }

    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
        let direction = params::text(params, "direction", "horizontal");
        match direction.to_ascii_lowercase().as_str() {
            "horizontal" | "h" => *image = image.fliph(),
            "vertical" | "v" => *image = image.flipv(),
            other => {
                return Err(params::invalid(
                    self.name(),
                    "direction",
                    format!("expected horizontal or vertical, got {other:?}"),
                ));
            }
        }
        Ok(())
    }
}
