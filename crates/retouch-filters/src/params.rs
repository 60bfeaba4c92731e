//! Typed parameter lookup for filter implementations.
//!
//! Filters read their parameters through these helpers so that missing
//! parameters fall back to a default and unusable values produce a
//! uniform [`FilterError::InvalidParameter`].

use crate::types::{FilterError, ParamValue, Parameters};

/// Read a numeric parameter, falling back to `default` when absent.
///
/// Both [`ParamValue::Float`] and [`ParamValue::Integer`] are accepted.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParameter`] if the parameter is present
/// but holds text.
pub fn number(
    filter: &str,
    params: &Parameters,
    name: &str,
    default: f64,
) -> Result<f64, FilterError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| invalid(filter, name, format!("expected a number, got {value:?}"))),
    }
}

/// Read a numeric parameter if present.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParameter`] if the parameter is present
/// but holds text.
pub fn optional_number(
    filter: &str,
    params: &Parameters,
    name: &str,
) -> Result<Option<f64>, FilterError> {
    params
        .get(name)
        .map(|value| {
            value
                .as_f64()
                .ok_or_else(|| invalid(filter, name, format!("expected a number, got {value:?}")))
        })
        .transpose()
}

/// Read a text parameter, falling back to `default` when absent.
///
/// Numeric values are rendered back to text, so `direction=1` reads as
/// `"1.0"` after float-first conversion.
#[must_use]
pub fn text<'a>(params: &'a Parameters, name: &str, default: &'a str) -> std::borrow::Cow<'a, str> {
    match params.get(name) {
        None => std::borrow::Cow::Borrowed(default),
        Some(ParamValue::Text(s)) => std::borrow::Cow::Borrowed(s.as_str()),
        Some(other) => std::borrow::Cow::Owned(other.to_string()),
    }
}

/// Build an [`FilterError::InvalidParameter`].
pub fn invalid(filter: &str, name: &str, reason: impl Into<String>) -> FilterError {
    FilterError::InvalidParameter {
        filter: filter.to_owned(),
        name: name.to_owned(),
        reason: reason.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, ParamValue)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_number_uses_default() {
        let p = Parameters::new();
        assert!((number("blur", &p, "sigma", 1.4).unwrap() - 1.4).abs() < f64::EPSILON);
    }

    #[test]
    fn integer_is_accepted_as_number() {
        let p = params(&[("degrees", ParamValue::Integer(90))]);
        assert!((number("rotate", &p, "degrees", 0.0).unwrap() - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn text_is_rejected_as_number() {
        let p = params(&[("level", ParamValue::Text("bright".to_owned()))]);
        let err = number("brightness", &p, "level", 1.0).unwrap_err();
        assert!(matches!(
            err,
            FilterError::InvalidParameter { ref filter, ref name, .. }
                if filter == "brightness" && name == "level"
        ));
    }

    #[test]
    fn optional_number_absent_is_none() {
        assert_eq!(
            optional_number("resize", &Parameters::new(), "width").unwrap(),
            None
        );
    }

    #[test]
    fn text_renders_numbers() {
        let p = params(&[("direction", ParamValue::Float(1.0))]);
        assert_eq!(text(&p, "direction", "horizontal"), "1.0");
        assert_eq!(text(&Parameters::new(), "direction", "horizontal"), "horizontal");
    }
}
