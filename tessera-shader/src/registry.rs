//! Registry owning all shader programs.

use std::collections::BTreeMap;

use crate::context::GraphicsContext;
use crate::defines::{DefineValue, Defines};
use crate::error::ShaderError;
use crate::pragma::{TransformSource, Transforms};
use crate::program::{GlProgram, ProgramId, ProgramOptions};

/// Owner of all programs of one graphics context, together with the global define and transform
/// tables applied to every program.
///
/// The registry lives as long as the context it was used with. Changing the global tables does
/// not recompile anything by itself: call [`ShaderRegistry::compile`] for the affected programs or
/// [`ShaderRegistry::recompile_all`].
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    defines: Defines,
    transforms: Transforms,
    programs: BTreeMap<ProgramId, GlProgram>,
    next_id: u64,
}

impl ShaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a global define.
    pub fn add_define(&mut self, name: impl Into<String>, value: impl Into<DefineValue>) {
        self.defines.insert(name.into(), value.into());
    }

    /// Removes a global define.
    pub fn remove_define(&mut self, name: &str) -> Option<DefineValue> {
        self.defines.remove(name)
    }

    /// Global defines.
    pub fn defines(&self) -> &Defines {
        &self.defines
    }

    /// Appends a global transform block (or several) under the key.
    pub fn add_transform(&mut self, key: impl Into<String>, source: impl Into<TransformSource>) {
        self.transforms
            .entry(key.into())
            .or_default()
            .extend(source.into().into_list());
    }

    /// Removes all global transforms registered under the key.
    pub fn clear_transform(&mut self, key: &str) {
        self.transforms.remove(key);
    }

    /// Global transforms.
    pub fn transforms(&self) -> &Transforms {
        &self.transforms
    }

    /// Registers a new program. It is not compiled until [`ShaderRegistry::compile`] is called.
    pub fn create_program(
        &mut self,
        vertex_template: impl Into<String>,
        fragment_template: impl Into<String>,
        options: ProgramOptions,
    ) -> ProgramId {
        self.next_id += 1;
        let id = ProgramId(self.next_id);
        self.programs.insert(
            id,
            GlProgram::new(id, vertex_template, fragment_template, options),
        );

        id
    }

    /// Program with the given id.
    pub fn program(&self, id: ProgramId) -> Option<&GlProgram> {
        self.programs.get(&id)
    }

    /// Mutable program with the given id.
    pub fn program_mut(&mut self, id: ProgramId) -> Option<&mut GlProgram> {
        self.programs.get_mut(&id)
    }

    /// Number of registered programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Returns true if no programs are registered.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Composes and compiles the program using the current global tables.
    pub fn compile(
        &mut self,
        context: &mut dyn GraphicsContext,
        id: ProgramId,
    ) -> Result<(), ShaderError> {
        let program = self
            .programs
            .get_mut(&id)
            .ok_or(ShaderError::UnknownProgram(id))?;

        program.compile(context, &self.defines, &self.transforms)
    }

    /// Recompiles every program. Failures do not stop the sweep and are returned together.
    pub fn recompile_all(&mut self, context: &mut dyn GraphicsContext) -> Vec<ShaderError> {
        let mut errors = vec![];
        for program in self.programs.values_mut() {
            if let Err(err) = program.compile(context, &self.defines, &self.transforms) {
                errors.push(err);
            }
        }

        errors
    }

    /// Drops the driver state of every program after the graphics context was lost. Call
    /// [`ShaderRegistry::recompile_all`] with the new context afterwards.
    pub fn context_lost(&mut self) {
        log::info!("Graphics context lost, invalidating {} programs", self.programs.len());
        for program in self.programs.values_mut() {
            program.invalidate();
        }
    }

    /// Pushes cached uniform values of every compiled program to the driver again.
    pub fn refresh_uniforms(&mut self, context: &mut dyn GraphicsContext) {
        for program in self.programs.values_mut() {
            program.refresh_uniforms(context);
        }
    }

    /// Unregisters the program and releases its driver object.
    pub fn remove_program(&mut self, context: &mut dyn GraphicsContext, id: ProgramId) {
        if let Some(mut program) = self.programs.remove(&id) {
            program.release(context);
        }
    }

    /// Releases every program. Used when the context is torn down.
    pub fn destroy(&mut self, context: &mut dyn GraphicsContext) {
        for (_, mut program) in std::mem::take(&mut self.programs) {
            program.release(context);
        }
    }
}
