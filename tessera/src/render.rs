//! Shader programs of the styles and the draw list of the finalized tiles.

use std::collections::BTreeMap;

use nalgebra::{Matrix4, Vector3};
use tessera_shader::{
    BufferHandle, GraphicsContext, ProgramId, ShaderError, ShaderRegistry, UniformValue,
};

use crate::style::Styles;
use crate::tile::{TileBounds, TILE_SCALE};
use crate::tile_manager::TileManager;

/// Uniform with the tile-local to clip space transform.
pub const TILE_MATRIX_UNIFORM: &str = "u_tile_matrix";

/// Vertex attribute enabled for a draw call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttributeBinding {
    /// Location in the linked program.
    pub location: u32,
    /// Number of `f32` components.
    pub components: usize,
    /// Byte offset inside a vertex.
    pub offset: usize,
}

/// One buffer of one tile drawn with the program of its style.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Program of the style.
    pub program: ProgramId,
    /// Style name.
    pub style: String,
    /// Tile key.
    pub tile: String,
    /// Vertex buffer.
    pub buffer: BufferHandle,
    /// Number of vertices to draw as a triangle list.
    pub vertex_count: usize,
    /// Draw order of the buffer.
    pub order: i32,
    /// Attributes active in the program.
    pub attributes: Vec<AttributeBinding>,
    /// Size of one vertex in bytes.
    pub stride: usize,
    /// Value of the tile matrix uniform, column-major.
    pub tile_matrix: [f32; 16],
}

/// One compiled program per style.
#[derive(Debug, Default, Clone)]
pub struct StylePrograms {
    programs: BTreeMap<String, ProgramId>,
}

impl StylePrograms {
    /// Creates and compiles the programs of all styles, then uploads the style uniforms.
    ///
    /// A style whose program fails to compile keeps its registered program so it can be fixed by
    /// a later recompilation. Its calls are left out of the draw list until then.
    pub fn prepare(
        registry: &mut ShaderRegistry,
        context: &mut dyn GraphicsContext,
        styles: &Styles,
    ) -> (Self, Vec<ShaderError>) {
        let mut programs = BTreeMap::new();
        let mut errors = vec![];

        for style in styles.iter() {
            let id = registry.create_program(
                style.vertex.clone(),
                style.fragment.clone(),
                style.program_options(),
            );
            if let Err(err) = registry.compile(context, id) {
                errors.push(err);
            }

            if let Some(program) = registry.program_mut(id) {
                program.set_uniforms(
                    context,
                    style
                        .uniforms
                        .iter()
                        .map(|(name, value)| (name.as_str(), value.clone())),
                    None,
                );
            }

            programs.insert(style.name.clone(), id);
        }

        (Self { programs }, errors)
    }

    /// Program of the style.
    pub fn program(&self, style: &str) -> Option<ProgramId> {
        self.programs.get(style).copied()
    }

    /// Removes the programs from the registry and releases them.
    pub fn release(self, registry: &mut ShaderRegistry, context: &mut dyn GraphicsContext) {
        for id in self.programs.into_values() {
            registry.remove_program(context, id);
        }
    }

    /// Draw calls for every uploaded buffer of the tracked tiles, sorted by draw order, then
    /// style name and tile key.
    ///
    /// `view` maps Web-Mercator meters to clip space.
    pub fn draw_calls(
        &self,
        registry: &mut ShaderRegistry,
        context: &mut dyn GraphicsContext,
        manager: &TileManager,
        view: &Matrix4<f64>,
    ) -> Vec<DrawCall> {
        let mut calls = vec![];

        for tile in manager.tiles() {
            if tile.buffers().is_empty() {
                continue;
            }

            let tile_matrix = tile_matrix(&tile.bounds(), view);
            for (style, buffer) in tile.buffers() {
                let Some(id) = self.program(style) else {
                    log::trace!("No program for style {style} of tile {}", tile.key());
                    continue;
                };
                let Some(program) = registry.program_mut(id) else {
                    continue;
                };
                if !program.is_compiled() {
                    continue;
                }

                let layout = buffer.kind.layout();
                let attributes = layout
                    .offsets()
                    .filter_map(|(attribute, offset)| {
                        program
                            .attribute(context, attribute.name)
                            .map(|location| AttributeBinding {
                                location,
                                components: attribute.components,
                                offset,
                            })
                    })
                    .collect();

                calls.push(DrawCall {
                    program: id,
                    style: style.clone(),
                    tile: tile.key().to_string(),
                    buffer: buffer.handle,
                    vertex_count: buffer.vertex_count,
                    order: buffer.order,
                    attributes,
                    stride: layout.stride(),
                    tile_matrix,
                });
            }
        }

        calls.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.style.cmp(&b.style))
                .then_with(|| a.tile.cmp(&b.tile))
        });

        calls
    }

    /// Makes the program of the call current and sets its tile matrix.
    pub fn bind(
        &self,
        registry: &mut ShaderRegistry,
        context: &mut dyn GraphicsContext,
        call: &DrawCall,
    ) -> Result<(), ShaderError> {
        let program = registry
            .program_mut(call.program)
            .ok_or(ShaderError::UnknownProgram(call.program))?;

        program.set_uniforms(
            context,
            [(TILE_MATRIX_UNIFORM, UniformValue::Mat4(call.tile_matrix))],
            None,
        );

        Ok(())
    }
}

/// Transform from tile-local coordinates of a tile with the given bounds to clip space.
pub fn tile_matrix(bounds: &TileBounds, view: &Matrix4<f64>) -> [f32; 16] {
    let scale = bounds.size() / TILE_SCALE;
    let local = Matrix4::new_translation(&Vector3::new(bounds.min[0], bounds.min[1], 0.0))
        * Matrix4::new_scaling(scale);

    let matrix = (view * local).cast::<f32>();
    let mut result = [0.0; 16];
    result.copy_from_slice(matrix.as_slice());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileCoords;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;
    use tessera_shader::HeadlessContext;

    #[test]
    fn tile_matrix_maps_local_corners() {
        let bounds = TileCoords::new(1, 0, 1).bounds();
        let matrix = Matrix4::from_column_slice(&tile_matrix(&bounds, &Matrix4::identity()));

        let origin = matrix * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(origin.y, 0.0, epsilon = 1e-3);

        let corner = matrix * Vector4::new(TILE_SCALE as f32, TILE_SCALE as f32, 0.0, 1.0);
        assert_relative_eq!(corner.x, 20037508.0, max_relative = 1e-6);
        assert_relative_eq!(corner.y, 20037508.0, max_relative = 1e-6);
    }

    #[test]
    fn prepares_program_per_style() {
        let mut registry = ShaderRegistry::new();
        let mut context = HeadlessContext::new();
        let (programs, errors) =
            StylePrograms::prepare(&mut registry, &mut context, &Styles::default());

        assert!(errors.is_empty());
        assert_eq!(registry.len(), 3);
        assert_eq!(context.live_programs().len(), 3);

        let polygons = programs.program("polygons").expect("builtin style");
        let handle = registry
            .program(polygons)
            .and_then(|p| p.handle())
            .expect("compiled");
        assert_eq!(
            context.uniform_value(handle, "u_light_direction"),
            Some(&UniformValue::Vec3([0.3, 0.4, -1.0]))
        );

        programs.release(&mut registry, &mut context);
        assert!(registry.is_empty());
        assert!(context.live_programs().is_empty());
    }

    #[test]
    fn failed_program_is_reported() {
        let mut registry = ShaderRegistry::new();
        let mut context = HeadlessContext::new().fail_on("a_offset");
        let (programs, errors) =
            StylePrograms::prepare(&mut registry, &mut context, &Styles::default());

        assert_eq!(errors.len(), 1);
        let points = programs.program("points").expect("registered");
        assert_eq!(registry.program(points).map(|p| p.is_compiled()), Some(false));
    }
}
