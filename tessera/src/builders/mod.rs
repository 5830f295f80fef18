//! Geometry builders writing features into per-style vertex data.

use bytes::Bytes;
use geojson::Value;
use lyon::lyon_tessellation::VertexBuffers;
use serde::{Deserialize, Serialize};

use crate::style::parser::StyleFeature;
use crate::style::StyleKind;
use crate::tile::TileBounds;

pub mod lines;
pub mod points;
pub mod polygons;

/// Growable vertex data of one style in one tile.
#[derive(Debug, Clone)]
pub struct VertexData {
    kind: StyleKind,
    data: Vec<u8>,
    vertex_count: usize,
    geometries: usize,
    order: Option<i32>,
}

impl VertexData {
    /// Creates empty data for the style kind.
    pub fn new(kind: StyleKind) -> Self {
        Self {
            kind,
            data: Vec::new(),
            vertex_count: 0,
            geometries: 0,
            order: None,
        }
    }

    /// Builder kind.
    pub fn kind(&self) -> StyleKind {
        self.kind
    }

    /// Number of vertices written.
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Number of geometries written.
    pub fn geometries(&self) -> usize {
        self.geometries
    }

    /// Returns true if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    pub(crate) fn push<V: bytemuck::Pod>(&mut self, vertices: &[V]) {
        self.data.extend_from_slice(bytemuck::cast_slice(vertices));
        self.vertex_count += vertices.len();
    }

    /// Builds the feature geometry with the builder of this kind. Geometries the builder does
    /// not handle are skipped. Returns the number of geometries written.
    pub fn add_feature(&mut self, geometry: &Value, feature: &StyleFeature, bounds: &TileBounds) -> usize {
        let before = self.vertex_count;
        let added = self.add_geometry(geometry, feature, bounds);

        self.geometries += added;
        if self.vertex_count > before {
            self.order = Some(self.order.map_or(feature.order, |o| o.min(feature.order)));
        }

        added
    }

    fn add_geometry(&mut self, geometry: &Value, feature: &StyleFeature, bounds: &TileBounds) -> usize {
        match (self.kind, geometry) {
            (StyleKind::Polygons, Value::Polygon(rings)) => {
                polygons::build(self, std::slice::from_ref(rings), feature, bounds)
            }
            (StyleKind::Polygons, Value::MultiPolygon(polygons)) => {
                polygons::build(self, polygons, feature, bounds)
            }
            (StyleKind::Lines, Value::LineString(line)) => {
                lines::build(self, std::slice::from_ref(line), false, feature, bounds)
            }
            (StyleKind::Lines, Value::MultiLineString(lines)) => {
                lines::build(self, lines, false, feature, bounds)
            }
            (StyleKind::Lines, Value::Polygon(rings)) => lines::build(self, rings, true, feature, bounds),
            (StyleKind::Lines, Value::MultiPolygon(polygons)) => polygons
                .iter()
                .map(|rings| lines::build(self, rings, true, feature, bounds))
                .sum(),
            (StyleKind::Points, Value::Point(point)) => {
                points::build(self, std::slice::from_ref(point), feature, bounds)
            }
            (StyleKind::Points, Value::MultiPoint(points)) => points::build(self, points, feature, bounds),
            (_, Value::GeometryCollection(geometries)) => geometries
                .iter()
                .map(|geometry| self.add_geometry(&geometry.value, feature, bounds))
                .sum(),
            _ => 0,
        }
    }

    /// Finalizes the data into an immutable buffer.
    pub fn end(self) -> VertexBuffer {
        debug_assert_eq!(self.data.len(), self.vertex_count * self.kind.layout().stride());

        VertexBuffer {
            kind: self.kind,
            data: Bytes::from(self.data),
            vertex_count: self.vertex_count,
            geometries: self.geometries,
            order: self.order.unwrap_or_default(),
        }
    }
}

/// Expands indexed tessellator output into a plain triangle list.
fn deindex<V: Copy>(buffers: &VertexBuffers<V, u32>) -> Vec<V> {
    buffers
        .indices
        .iter()
        .map(|&index| buffers.vertices[index as usize])
        .collect()
}

/// Converts GeoJSON positions to tile-local points, skipping malformed ones. The closing position
/// of a ring is dropped.
fn local_points(positions: &[Vec<f64>], bounds: &TileBounds, closed: bool) -> Vec<[f32; 2]> {
    let mut points: Vec<[f32; 2]> = positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| bounds.to_local(p[0], p[1]))
        .collect();

    if closed && points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    points
}

/// Finalized vertex data of one style in one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexBuffer {
    /// Builder kind, defines the layout.
    pub kind: StyleKind,
    /// Interleaved vertices.
    pub data: Bytes,
    /// Number of vertices.
    pub vertex_count: usize,
    /// Number of geometries in the buffer.
    pub geometries: usize,
    /// Lowest draw order of the features in the buffer.
    pub order: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::rule::LineCap;
    use crate::tile::TileCoords;
    use crate::Color;

    pub(crate) fn feature() -> StyleFeature {
        StyleFeature {
            color: Color::rgba(255, 0, 0, 255),
            width: 10.0,
            size: 6.0,
            extrude: 0.0,
            cap: LineCap::Butt,
            order: 3,
        }
    }

    #[test]
    fn skips_unsupported_geometry() {
        let bounds = TileCoords::new(0, 0, 0).bounds();
        let mut data = VertexData::new(StyleKind::Points);
        let line = Value::LineString(vec![vec![0.0, 0.0], vec![10.0, 10.0]]);

        assert_eq!(data.add_feature(&line, &feature(), &bounds), 0);
        assert!(data.is_empty());
    }

    #[test]
    fn geometry_collection() {
        let bounds = TileCoords::new(0, 0, 0).bounds();
        let mut data = VertexData::new(StyleKind::Points);
        let collection = Value::GeometryCollection(vec![
            geojson::Geometry::new(Value::Point(vec![0.0, 0.0])),
            geojson::Geometry::new(Value::MultiPoint(vec![vec![1.0, 1.0], vec![2.0, 2.0]])),
        ]);

        assert_eq!(data.add_feature(&collection, &feature(), &bounds), 3);
        let buffer = data.end();
        assert_eq!(buffer.geometries, 3);
        assert_eq!(buffer.vertex_count, 18);
        assert_eq!(buffer.data.len(), 18 * StyleKind::Points.layout().stride());
        assert_eq!(buffer.order, 3);
    }
}
