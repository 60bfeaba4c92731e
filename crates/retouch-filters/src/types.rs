//! Shared types for retouch filters and filter chains.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `DynamicImage` so downstream crates can hand images to
/// filters without depending on `image` directly.
pub use image::DynamicImage;

/// Name recorded in filter chains for edits produced by the AI provider.
///
/// It is never registered as an engine filter, so replaying a chain
/// skips it.
pub const AI_EDIT_FILTER: &str = "AI Edit";

/// A typed filter parameter value.
///
/// Raw parameters arrive as strings and are converted with
/// [`ParamValue::from_raw`]. Serialization is untagged: integers become
/// JSON integers, floats keep a fractional part (`3.0`), text becomes a
/// JSON string. The variant order matters for deserialization: `3`
/// must come back as [`ParamValue::Integer`] and `3.0` as
/// [`ParamValue::Float`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Whole number value.
    Integer(i64),
    /// Floating point value. Always finite.
    Float(f64),
    /// Anything that did not parse as a number.
    Text(String),
}

impl ParamValue {
    /// Convert a raw string parameter into a typed value.
    ///
    /// Float parsing is attempted first, then integer parsing, then the
    /// value is kept as text. Because every integer literal is also a
    /// valid float literal, whole numbers such as `"3"` become
    /// `Float(3.0)`. Filters that branch on the parameter type rely on
    /// this precedence.
    ///
    /// Surrounding whitespace is ignored for the numeric attempts.
    /// Non-finite spellings (`"inf"`, `"NaN"`) are kept as text, since a
    /// non-finite float cannot be stored in a JSON snapshot.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                return Self::Float(value);
            }
        } else if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Integer(value);
        }
        Self::Text(raw.to_owned())
    }

    /// The value as a float, if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Text(_) => None,
        }
    }

    /// The value as text, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Float(_) | Self::Integer(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Typed parameters of one filter application, keyed by parameter name.
pub type Parameters = BTreeMap<String, ParamValue>;

/// Convert a raw `name -> string` parameter map into typed [`Parameters`].
///
/// Each value goes through [`ParamValue::from_raw`].
#[must_use]
pub fn convert_parameters<'a, I>(raw: I) -> Parameters
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    raw.into_iter()
        .map(|(name, value)| (name.clone(), ParamValue::from_raw(value)))
        .collect()
}

/// One entry in a filter chain: a named filter and the parameters it
/// was applied with.
///
/// Chains are ordered; replaying entries left to right on the root image
/// reproduces the derived image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilter {
    /// Registry name of the filter.
    #[serde(alias = "FilterName")]
    pub filter_name: String,
    /// Typed parameters, possibly empty.
    #[serde(default, alias = "Parameters")]
    pub parameters: Parameters,
}

impl AppliedFilter {
    /// Create an applied filter entry.
    #[must_use]
    pub fn new(filter_name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            filter_name: filter_name.into(),
            parameters,
        }
    }
}

/// Public description of a registered filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Unique registry name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

/// Errors that can occur while registering or running filters.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// No filter is registered under the requested name.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// Two filters were registered under the same name.
    #[error("filter registered twice: {0}")]
    DuplicateFilter(String),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// A parameter was present but unusable by the filter.
    #[error("filter {filter}: invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Filter that rejected the parameter.
        filter: String,
        /// Parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn whole_number_converts_to_float() {
        assert_eq!(ParamValue::from_raw("3"), ParamValue::Float(3.0));
    }

    #[test]
    fn fractional_number_converts_to_float() {
        assert_eq!(ParamValue::from_raw("3.5"), ParamValue::Float(3.5));
    }

    #[test]
    fn non_numeric_stays_text() {
        assert_eq!(
            ParamValue::from_raw("abc"),
            ParamValue::Text("abc".to_owned())
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored_for_numbers() {
        assert_eq!(ParamValue::from_raw(" 1.2 "), ParamValue::Float(1.2));
    }

    #[test]
    fn non_finite_spellings_stay_text() {
        assert_eq!(
            ParamValue::from_raw("inf"),
            ParamValue::Text("inf".to_owned())
        );
        assert_eq!(
            ParamValue::from_raw("NaN"),
            ParamValue::Text("NaN".to_owned())
        );
    }

    #[test]
    fn convert_parameters_keeps_every_key() {
        let raw: BTreeMap<String, String> = [
            ("level".to_owned(), "1.2".to_owned()),
            ("mode".to_owned(), "soft".to_owned()),
        ]
        .into_iter()
        .collect();
        let params = convert_parameters(&raw);
        assert_eq!(params.len(), 2);
        assert_eq!(params["level"], ParamValue::Float(1.2));
        assert_eq!(params["mode"], ParamValue::Text("soft".to_owned()));
    }

    #[test]
    fn param_value_json_keeps_variant() {
        let values = vec![
            ParamValue::Integer(3),
            ParamValue::Float(3.0),
            ParamValue::Text("3x".to_owned()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[3,3.0,"3x"]"#);
        let back: Vec<ParamValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn applied_filter_reads_pascal_case_fields() {
        let json = r#"{"FilterName":"grayscale","Parameters":{}}"#;
        let filter: AppliedFilter = serde_json::from_str(json).unwrap();
        assert_eq!(filter.filter_name, "grayscale");
        assert!(filter.parameters.is_empty());
    }

    #[test]
    fn applied_filter_parameters_default_to_empty() {
        let filter: AppliedFilter = serde_json::from_str(r#"{"filterName":"invert"}"#).unwrap();
        assert_eq!(filter, AppliedFilter::new("invert", Parameters::new()));
    }

    #[test]
    fn display_marks_floats() {
        assert_eq!(ParamValue::Float(3.0).to_string(), "3.0");
        assert_eq!(ParamValue::Integer(3).to_string(), "3");
    }
}
