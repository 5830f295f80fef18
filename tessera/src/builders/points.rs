use super::VertexData;
use crate::style::parser::StyleFeature;
use crate::tile::TileBounds;

/// Vertex of the `points` styles. Every point is a quad: all four corners share the position
/// and are moved by `offset` pixels on screen.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointVertex {
    /// Position in tile-local units.
    pub position: [f32; 3],
    /// Screen offset of the corner in pixels.
    pub offset: [f32; 2],
    /// Corner texture coordinates.
    pub texcoord: [f32; 2],
    /// Color.
    pub color: [f32; 4],
    /// Draw order.
    pub layer: f32,
}

const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
const QUAD: [usize; 6] = [0, 1, 2, 0, 2, 3];

pub(super) fn build(
    data: &mut VertexData,
    points: &[Vec<f64>],
    feature: &StyleFeature,
    bounds: &TileBounds,
) -> usize {
    let half = feature.size as f32 / 2.0;
    let color = feature.color.to_f32_array();
    let mut count = 0;

    for position in points.iter().filter(|p| p.len() >= 2) {
        let [x, y] = bounds.to_local(position[0], position[1]);
        let vertices = QUAD.map(|corner| {
            let [cx, cy] = CORNERS[corner];
            PointVertex {
                position: [x, y, 0.0],
                offset: [cx * half, cy * half],
                texcoord: [(cx + 1.0) / 2.0, (cy + 1.0) / 2.0],
                color,
                layer: feature.order as f32,
            }
        });

        data.push(&vertices);
        count += 1;
    }

    count
}
