//! Context a feature is matched and styled in.

use std::borrow::Cow;

use geojson::Feature;
use serde_json::Value;

use crate::geometry::GeometryKind;

/// Everything filters and computed style values can read about a feature.
#[derive(Debug, Clone, Copy)]
pub struct FeatureContext<'a> {
    /// The feature.
    pub feature: &'a Feature,
    /// Zoom level of the requested tile.
    pub zoom: f64,
    /// Name of the scene layer the feature is drawn by.
    pub layer: &'a str,
    /// Geometry class of the feature.
    pub geometry: Option<GeometryKind>,
}

impl<'a> FeatureContext<'a> {
    /// Creates a context for the feature.
    pub fn new(feature: &'a Feature, zoom: f64, layer: &'a str) -> Self {
        Self {
            feature,
            zoom,
            layer,
            geometry: feature
                .geometry
                .as_ref()
                .and_then(|geometry| GeometryKind::of(&geometry.value)),
        }
    }

    /// Value of a feature property.
    pub fn property(&self, name: &str) -> Option<&'a Value> {
        self.feature.property(name)
    }

    /// Value of a property or of one of the special keys `$zoom`, `$geometry` and `$layer`.
    pub fn lookup(&self, name: &str) -> Option<Cow<'a, Value>> {
        match name {
            "$zoom" => Some(Cow::Owned(Value::from(self.zoom))),
            "$geometry" => self
                .geometry
                .map(|kind| Cow::Owned(Value::from(kind.as_str()))),
            "$layer" => Some(Cow::Owned(Value::from(self.layer))),
            name => self.property(name).map(Cow::Borrowed),
        }
    }
}
