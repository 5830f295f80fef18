//! Selection of the features a layer draws from the raw tile data.

use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use geojson::FeatureCollection;

use crate::geometry::{empty_collection, TileData};

/// Host function producing a layer's features from all raw layers of a tile.
pub type TransformFn = dyn Fn(&TileData) -> FeatureCollection + Send + Sync;

/// Describes which features of the source a layer uses.
#[derive(Clone)]
pub enum GeometryFilter {
    /// Sub-layer with the exact name.
    Layer(String),
    /// Features of every sub-layer, in layer name order.
    All,
    /// Result of a host function.
    Transform(Arc<TransformFn>),
}

impl Debug for GeometryFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Layer(name) => f.debug_tuple("Layer").field(name).finish(),
            Self::All => write!(f, "All"),
            Self::Transform(_) => write!(f, "Transform(..)"),
        }
    }
}

impl GeometryFilter {
    /// Filter from a layer name as written in the scene. `*` selects all layers.
    pub fn from_name(name: &str) -> Self {
        match name {
            "*" => Self::All,
            name => Self::Layer(name.to_string()),
        }
    }
}

/// Returns the features selected by the filter. Missing data gives an empty collection.
pub fn resolve<'a>(data: Option<&'a TileData>, filter: &GeometryFilter) -> Cow<'a, FeatureCollection> {
    let Some(data) = data else {
        return Cow::Owned(empty_collection());
    };

    match filter {
        GeometryFilter::Layer(name) => match data.layer(name) {
            Some(layer) => Cow::Borrowed(layer),
            None => Cow::Owned(empty_collection()),
        },
        GeometryFilter::All => {
            let mut merged = empty_collection();
            for (_, layer) in data.layers() {
                merged.features.extend(layer.features.iter().cloned());
            }
            Cow::Owned(merged)
        }
        GeometryFilter::Transform(transform) => Cow::Owned(transform(data)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Feature, Geometry, Value};

    fn collection(count: usize) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: (0..count)
                .map(|i| Feature {
                    geometry: Some(Geometry::new(Value::Point(vec![i as f64, 0.0]))),
                    ..Default::default()
                })
                .collect(),
            foreign_members: None,
        }
    }

    fn data() -> TileData {
        TileData::new()
            .with_layer("water", collection(2))
            .with_layer("buildings", collection(3))
    }

    #[test]
    fn exact_layer_lookup() {
        let data = data();
        let resolved = resolve(Some(&data), &GeometryFilter::Layer("water".into()));
        assert_eq!(resolved.features.len(), 2);
        assert!(matches!(resolved, Cow::Borrowed(_)));
    }

    #[test]
    fn missing_layer_is_empty() {
        let data = data();
        let resolved = resolve(Some(&data), &GeometryFilter::Layer("roads".into()));
        assert!(resolved.features.is_empty());

        let resolved = resolve(None, &GeometryFilter::All);
        assert!(resolved.features.is_empty());
    }

    #[test]
    fn all_layers() {
        let data = data();
        let resolved = resolve(Some(&data), &GeometryFilter::from_name("*"));
        assert_eq!(resolved.features.len(), 5);
    }

    #[test]
    fn transform_function() {
        let data = data();
        let filter = GeometryFilter::Transform(Arc::new(|data: &TileData| {
            let mut result = empty_collection();
            if let Some(layer) = data.layer("buildings") {
                result.features.push(layer.features[0].clone());
            }
            result
        }));

        assert_eq!(resolve(Some(&data), &filter).features.len(), 1);
    }
}
