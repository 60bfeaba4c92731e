//! Filter registry: the static mapping from filter name to implementation.
//!
//! This module defines the [`Filter`] trait every image filter
//! implements and the [`FilterRegistry`] that owns them.
//!
//! # Lifecycle
//!
//! The registry is built once at startup, either from
//! [`FilterRegistry::builtin`] or from an explicit list passed to
//! [`FilterRegistry::new`]. It has no mutating methods afterwards, so a
//! shared reference can be read from any number of threads.

use std::collections::HashMap;

use image::DynamicImage;

use crate::types::{AppliedFilter, FilterError, FilterSpec, Parameters};

/// Trait for image filters.
///
/// A filter mutates an image in place according to its typed
/// parameters. Filters must be deterministic: the same input image and
/// parameters always produce the same output, which is what makes
/// replaying a chain from the root image reproduce a derived image.
pub trait Filter: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Apply the filter to `image`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidParameter`] if a parameter is
    /// present but unusable.
    fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError>;
}

/// Immutable set of named filters, kept in registration order.
pub struct FilterRegistry {
    filters: Vec<Box<dyn Filter>>,
    by_name: HashMap<String, usize>,
}

impl FilterRegistry {
    /// Build a registry from a list of filters.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::DuplicateFilter`] if two filters share a
    /// name. The process should not start with an ambiguous registry.
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Result<Self, FilterError> {
        let mut by_name = HashMap::with_capacity(filters.len());
        for (index, filter) in filters.iter().enumerate() {
            if by_name.insert(filter.name().to_owned(), index).is_some() {
                return Err(FilterError::DuplicateFilter(filter.name().to_owned()));
            }
        }
        Ok(Self { filters, by_name })
    }

    /// Registry holding every filter shipped with this crate.
    ///
    /// # Errors
    ///
    /// Only fails if two built-in filters share a name.
    pub fn builtin() -> Result<Self, FilterError> {
        Self::new(crate::builtin_filters())
    }

    /// Look up a filter by name.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownFilter`] if nothing is registered
    /// under `name`.
    pub fn lookup(&self, name: &str) -> Result<&dyn Filter, FilterError> {
        self.by_name
            .get(name)
            .map(|&index| self.filters[index].as_ref())
            .ok_or_else(|| FilterError::UnknownFilter(name.to_owned()))
    }

    /// Whether a filter is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Descriptions of every registered filter, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<FilterSpec> {
        self.filters
            .iter()
            .map(|f| FilterSpec {
                name: f.name().to_owned(),
                description: f.description().to_owned(),
            })
            .collect()
    }

    /// Number of registered filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Replay a filter chain on `image`, strictly in chain order.
    ///
    /// Entries whose name is not registered (such as
    /// [`AI_EDIT_FILTER`](crate::types::AI_EDIT_FILTER)) cannot be
    /// reproduced by the engine and are skipped. The names of skipped
    /// entries are returned so the caller can report them.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a filter; later entries are not
    /// applied.
    pub fn replay(
        &self,
        image: &mut DynamicImage,
        chain: &[AppliedFilter],
    ) -> Result<Vec<String>, FilterError> {
        let mut skipped = Vec::new();
        for entry in chain {
            match self.by_name.get(&entry.filter_name) {
                Some(&index) => self.filters[index].apply(image, &entry.parameters)?,
                None => skipped.push(entry.filter_name.clone()),
            }
        }
        Ok(skipped)
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{AI_EDIT_FILTER, ParamValue};

    /// Adds a constant to the red channel of every pixel.
    struct AddRed(&'static str);

    impl Filter for AddRed {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "adds to red"
        }

        fn apply(&self, image: &mut DynamicImage, params: &Parameters) -> Result<(), FilterError> {
            let amount = crate::params::number(self.0, params, "amount", 1.0)?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let amount = amount as u8;
            let mut rgba = image.to_rgba8();
            for p in rgba.pixels_mut() {
                p.0[0] = p.0[0].saturating_add(amount);
            }
            *image = DynamicImage::ImageRgba8(rgba);
            Ok(())
        }
    }

    fn black() -> DynamicImage {
        DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255])))
    }

    fn entry(name: &str, amount: f64) -> AppliedFilter {
        let mut params = Parameters::new();
        params.insert("amount".to_owned(), ParamValue::Float(amount));
        AppliedFilter::new(name, params)
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = FilterRegistry::new(vec![Box::new(AddRed("red")), Box::new(AddRed("red"))]);
        assert!(matches!(result, Err(FilterError::DuplicateFilter(ref n)) if n == "red"));
    }

    #[test]
    fn lookup_unknown_fails() {
        let registry = FilterRegistry::new(vec![Box::new(AddRed("red"))]).unwrap();
        assert!(matches!(
            registry.lookup("blue"),
            Err(FilterError::UnknownFilter(ref n)) if n == "blue"
        ));
        assert_eq!(registry.lookup("red").unwrap().name(), "red");
    }

    #[test]
    fn list_keeps_registration_order() {
        let registry =
            FilterRegistry::new(vec![Box::new(AddRed("zeta")), Box::new(AddRed("alpha"))])
                .unwrap();
        let names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }

    #[test]
    fn replay_applies_in_order_and_skips_unregistered() {
        let registry = FilterRegistry::new(vec![Box::new(AddRed("red"))]).unwrap();
        let chain = vec![
            entry("red", 10.0),
            AppliedFilter::new(AI_EDIT_FILTER, Parameters::new()),
            entry("red", 5.0),
        ];
        let mut img = black();
        let skipped = registry.replay(&mut img, &chain).unwrap();
        assert_eq!(skipped, [AI_EDIT_FILTER]);
        assert_eq!(img.to_rgba8().get_pixel(0, 0).0, [15, 0, 0, 255]);
    }

    #[test]
    fn replay_stops_at_first_error() {
        let registry = FilterRegistry::new(vec![Box::new(AddRed("red"))]).unwrap();
        let mut bad = Parameters::new();
        bad.insert("amount".to_owned(), ParamValue::Text("lots".to_owned()));
        let chain = vec![AppliedFilter::new("red", bad), entry("red", 5.0)];
        let mut img = black();
        assert!(registry.replay(&mut img, &chain).is_err());
        assert_eq!(img.to_rgba8().get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn builtin_registry_has_unique_names() {
        let registry = FilterRegistry::builtin().unwrap();
        assert!(!registry.is_empty());
        assert!(registry.contains("grayscale"));
        assert!(registry.contains("brightness"));
        assert!(!registry.contains(AI_EDIT_FILTER));
    }
}
