use lyon::lyon_tessellation::{
    BuffersBuilder, LineJoin, StrokeOptions, StrokeTessellator, StrokeVertex,
    StrokeVertexConstructor, VertexBuffers,
};
use lyon::math::point;
use lyon::path::Path;

use super::{deindex, local_points, VertexData};
use crate::style::parser::StyleFeature;
use crate::tile::TileBounds;

/// Vertex of the `lines` styles. `normal` is the unit extrusion direction of the stroke edge.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    /// Position in tile-local units.
    pub position: [f32; 3],
    /// Extrusion direction.
    pub normal: [f32; 2],
    /// Color.
    pub color: [f32; 4],
    /// Draw order.
    pub layer: f32,
}

struct LineVertexConstructor {
    color: [f32; 4],
    layer: f32,
}

impl StrokeVertexConstructor<LineVertex> for LineVertexConstructor {
    fn new_vertex(&mut self, vertex: StrokeVertex) -> LineVertex {
        let position = vertex.position();
        let normal = vertex.normal();
        LineVertex {
            position: [position.x, position.y, 0.0],
            normal: [normal.x, normal.y],
            color: self.color,
            layer: self.layer,
        }
    }
}

/// Strokes the lines. Closed lines are polygon rings drawn as outlines.
pub(super) fn build(
    data: &mut VertexData,
    lines: &[Vec<Vec<f64>>],
    closed: bool,
    feature: &StyleFeature,
    bounds: &TileBounds,
) -> usize {
    let options = StrokeOptions::DEFAULT
        .with_line_width(bounds.meters_to_local(feature.width))
        .with_line_cap(feature.cap.into())
        .with_line_join(LineJoin::MiterClip)
        .with_miter_limit(2.0)
        .with_tolerance(0.1);
    let mut tessellator = StrokeTessellator::new();
    let mut count = 0;

    for line in lines {
        let points = local_points(line, bounds, closed);
        let Some((first, rest)) = points.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let mut builder = Path::builder();
        let _ = builder.begin(point(first[0], first[1]));
        for p in rest {
            let _ = builder.line_to(point(p[0], p[1]));
        }
        builder.end(closed);
        let path = builder.build();

        let mut buffers: VertexBuffers<LineVertex, u32> = VertexBuffers::new();
        let constructor = LineVertexConstructor {
            color: feature.color.to_f32_array(),
            layer: feature.order as f32,
        };
        if let Err(err) = tessellator.tessellate_path(
            &path,
            &options,
            &mut BuffersBuilder::new(&mut buffers, constructor),
        ) {
            log::warn!("Failed to tessellate line: {err:?}");
            continue;
        }

        data.push(&deindex(&buffers));
        count += 1;
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests::feature;
    use crate::style::StyleKind;
    use crate::tile::{TileCoords, TILE_SCALE};

    fn vertices(data: VertexData) -> Vec<LineVertex> {
        let buffer = data.end();
        buffer
            .data
            .chunks_exact(std::mem::size_of::<LineVertex>())
            .map(bytemuck::pod_read_unaligned::<LineVertex>)
            .collect()
    }

    #[test]
    fn vertex_matches_layout() {
        assert_eq!(
            std::mem::size_of::<LineVertex>(),
            StyleKind::Lines.layout().stride()
        );
    }

    #[test]
    fn strokes_line_with_width() {
        let bounds = TileCoords::new(0, 0, 0).bounds();
        let mut data = VertexData::new(StyleKind::Lines);
        let mut style = feature();
        style.width = bounds.size() / TILE_SCALE * 20.0;

        let line = vec![vec![-1e6, 0.0], vec![1e6, 0.0]];
        assert_eq!(build(&mut data, &[line], false, &style, &bounds), 1);
        assert_eq!(data.vertex_count() % 3, 0);

        let vertices = vertices(data);
        assert!(!vertices.is_empty());
        for vertex in vertices {
            approx::assert_relative_eq!((vertex.position[1] - 2048.0).abs(), 10.0, epsilon = 0.01);
            assert_eq!(vertex.color, [1.0, 0.0, 0.0, 1.0]);
            assert_eq!(vertex.layer, 3.0);
        }
    }

    #[test]
    fn skips_degenerate_lines() {
        let bounds = TileCoords::new(0, 0, 0).bounds();
        let mut data = VertexData::new(StyleKind::Lines);
        let lines = vec![vec![vec![1.0, 1.0]], vec![]];
        assert_eq!(build(&mut data, &lines, false, &feature(), &bounds), 0);
        assert!(data.is_empty());
    }
}
