//! Raw tile data as delivered by a source.

use std::collections::BTreeMap;

use geojson::{FeatureCollection, Geometry, Value};
use serde::{Deserialize, Serialize};

use crate::error::TesseraError;
use crate::tile::HALF_CIRCUMFERENCE;

/// Name of the layer a plain feature collection is stored under.
pub const DEFAULT_LAYER: &str = "_default";

/// Geometry class used by filters and for choosing the default style.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    /// `Point` and `MultiPoint`.
    Point,
    /// `LineString` and `MultiLineString`.
    Line,
    /// `Polygon` and `MultiPolygon`.
    Polygon,
}

impl GeometryKind {
    /// Kind of a GeoJSON geometry. Geometry collections have no single kind.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Point(_) | Value::MultiPoint(_) => Some(Self::Point),
            Value::LineString(_) | Value::MultiLineString(_) => Some(Self::Line),
            Value::Polygon(_) | Value::MultiPolygon(_) => Some(Self::Polygon),
            Value::GeometryCollection(_) => None,
        }
    }

    /// Name as used in filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Polygon => "polygon",
        }
    }
}

/// Data of one tile of one source: named layers of features in projected meters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileData {
    layers: BTreeMap<String, FeatureCollection>,
}

impl TileData {
    /// Creates tile data without layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer.
    pub fn with_layer(mut self, name: impl Into<String>, features: FeatureCollection) -> Self {
        self.insert_layer(name, features);
        self
    }

    /// Adds or replaces a layer.
    pub fn insert_layer(&mut self, name: impl Into<String>, features: FeatureCollection) {
        self.layers.insert(name.into(), features);
    }

    /// Layer with the given name.
    pub fn layer(&self, name: &str) -> Option<&FeatureCollection> {
        self.layers.get(name)
    }

    /// Iterates over all layers in name order.
    pub fn layers(&self) -> impl Iterator<Item = (&str, &FeatureCollection)> {
        self.layers.iter().map(|(name, layer)| (name.as_str(), layer))
    }

    /// Returns true if the tile has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Decodes tile data from JSON.
    ///
    /// A plain `FeatureCollection` is stored as the [`DEFAULT_LAYER`]. Otherwise the document
    /// must be an object mapping layer names to feature collections.
    pub fn from_geojson(json: &str) -> Result<Self, TesseraError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let is_collection = value.get("type").and_then(|t| t.as_str()) == Some("FeatureCollection");
        if is_collection {
            let collection: FeatureCollection = serde_json::from_value(value)?;
            return Ok(Self::new().with_layer(DEFAULT_LAYER, collection));
        }

        let layers: BTreeMap<String, FeatureCollection> = serde_json::from_value(value)?;
        Ok(Self { layers })
    }

    /// Reprojects every coordinate from longitude/latitude degrees to Web-Mercator meters.
    pub fn project_lnglat(mut self) -> Self {
        for layer in self.layers.values_mut() {
            for feature in &mut layer.features {
                if let Some(geometry) = &mut feature.geometry {
                    project_geometry(geometry);
                }
            }
        }

        self
    }
}

/// Creates an empty feature collection.
pub fn empty_collection() -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: vec![],
        foreign_members: None,
    }
}

/// Web-Mercator projection of a longitude/latitude pair.
pub fn lnglat_to_meters(lng: f64, lat: f64) -> [f64; 2] {
    let lat = lat.clamp(-85.05112878, 85.05112878);
    let x = lng * HALF_CIRCUMFERENCE / 180.0;
    let y = (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln() * HALF_CIRCUMFERENCE
        / std::f64::consts::PI;
    [x, y]
}

fn project_geometry(geometry: &mut Geometry) {
    fn project(position: &mut Vec<f64>) {
        if position.len() >= 2 {
            let [x, y] = lnglat_to_meters(position[0], position[1]);
            position[0] = x;
            position[1] = y;
        }
    }

    match &mut geometry.value {
        Value::Point(p) => project(p),
        Value::MultiPoint(points) | Value::LineString(points) => points.iter_mut().for_each(project),
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines
            .iter_mut()
            .flat_map(|line| line.iter_mut())
            .for_each(project),
        Value::MultiPolygon(polygons) => polygons
            .iter_mut()
            .flat_map(|polygon| polygon.iter_mut())
            .flat_map(|ring| ring.iter_mut())
            .for_each(project),
        Value::GeometryCollection(geometries) => geometries.iter_mut().for_each(project_geometry),
    }
}
