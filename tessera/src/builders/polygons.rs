use lyon::lyon_tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, FillVertexConstructor,
    VertexBuffers,
};
use lyon::math::point;
use lyon::path::Path;

use super::{deindex, local_points, VertexData};
use crate::style::parser::StyleFeature;
use crate::tile::TileBounds;

/// Vertex of the `polygons` styles.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PolygonVertex {
    /// Position in tile-local units. `z` is the extrusion height.
    pub position: [f32; 3],
    /// Surface normal.
    pub normal: [f32; 3],
    /// Color.
    pub color: [f32; 4],
    /// Draw order.
    pub layer: f32,
}

struct PolygonVertexConstructor {
    height: f32,
    color: [f32; 4],
    layer: f32,
}

impl FillVertexConstructor<PolygonVertex> for PolygonVertexConstructor {
    fn new_vertex(&mut self, vertex: FillVertex) -> PolygonVertex {
        let position = vertex.position();
        PolygonVertex {
            position: [position.x, position.y, self.height],
            normal: [0.0, 0.0, 1.0],
            color: self.color,
            layer: self.layer,
        }
    }
}

/// Fills the polygons. The first ring of a polygon is the outer one, the rest are holes.
pub(super) fn build(
    data: &mut VertexData,
    polygons: &[Vec<Vec<Vec<f64>>>],
    feature: &StyleFeature,
    bounds: &TileBounds,
) -> usize {
    let height = bounds.meters_to_local(feature.extrude);
    let color = feature.color.to_f32_array();
    let layer = feature.order as f32;
    let options = FillOptions::DEFAULT.with_fill_rule(FillRule::EvenOdd);
    let mut tessellator = FillTessellator::new();
    let mut count = 0;

    for polygon in polygons {
        let rings: Vec<_> = polygon
            .iter()
            .map(|ring| local_points(ring, bounds, true))
            .filter(|ring| ring.len() >= 3)
            .collect();
        if rings.is_empty() {
            continue;
        }

        let mut builder = Path::builder();
        for ring in &rings {
            let _ = builder.begin(point(ring[0][0], ring[0][1]));
            for p in &ring[1..] {
                let _ = builder.line_to(point(p[0], p[1]));
            }
            builder.end(true);
        }
        let path = builder.build();

        let mut buffers: VertexBuffers<PolygonVertex, u32> = VertexBuffers::new();
        let constructor = PolygonVertexConstructor {
            height,
            color,
            layer,
        };
        if let Err(err) = tessellator.tessellate_path(
            &path,
            &options,
            &mut BuffersBuilder::new(&mut buffers, constructor),
        ) {
            log::warn!("Failed to tessellate polygon: {err:?}");
            continue;
        }

        data.push(&deindex(&buffers));
        if height > 0.0 {
            for (index, ring) in rings.iter().enumerate() {
                data.push(&walls(ring, index == 0, height, color, layer));
            }
        }

        count += 1;
    }

    count
}

fn signed_area(ring: &[[f32; 2]]) -> f32 {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(a, b)| a[0] * b[1] - b[0] * a[1])
        .sum::<f32>()
        / 2.0
}

/// Side walls of an extruded ring. The outer ring is walked counter-clockwise and holes clockwise,
/// so the right-hand normal of every edge points away from the solid.
fn walls(ring: &[[f32; 2]], outer: bool, height: f32, color: [f32; 4], layer: f32) -> Vec<PolygonVertex> {
    let mut points = ring.to_vec();
    if (signed_area(&points) > 0.0) != outer {
        points.reverse();
    }

    let mut vertices = Vec::with_capacity(points.len() * 6);
    for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            continue;
        }

        let normal = [dy / length, -dx / length, 0.0];
        let vertex = |p: &[f32; 2], z: f32| PolygonVertex {
            position: [p[0], p[1], z],
            normal,
            color,
            layer,
        };

        vertices.extend_from_slice(&[
            vertex(a, 0.0),
            vertex(b, 0.0),
            vertex(b, height),
            vertex(a, 0.0),
            vertex(b, height),
            vertex(a, height),
        ]);
    }

    vertices
}
