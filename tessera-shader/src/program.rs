//! Composition of shader sources and compiled programs.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

use crate::context::{GraphicsContext, ProgramHandle};
use crate::defines::{self, DefineValue, Defines};
use crate::error::ShaderError;
use crate::pragma::{self, Transforms};
use crate::uniform::{declare_missing_uniforms, UniformBinding, UniformMethod, UniformValue};

/// Identifier of a program. Ids are assigned in increasing order by the registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(pub(crate) u64);

impl Display for ProgramId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-program compilation inputs.
#[derive(Debug, Clone, Default)]
pub struct ProgramOptions {
    /// Name used in diagnostics.
    pub name: Option<String>,
    /// Program defines, override the global ones.
    pub defines: Defines,
    /// Program transforms, injected after the global ones.
    pub transforms: Transforms,
    /// Uniforms the transforms may use. Missing declarations are synthesized for them.
    pub dependent_uniforms: BTreeMap<String, UniformValue>,
}

impl ProgramOptions {
    /// Options with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Final shader sources handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderSources {
    /// Vertex stage.
    pub vertex: String,
    /// Fragment stage.
    pub fragment: String,
}

/// Composes the final sources from the templates. This is a pure function of its inputs: the
/// same templates, tables and options always produce byte-identical output.
pub fn compose(
    id: ProgramId,
    vertex_template: &str,
    fragment_template: &str,
    global_defines: &Defines,
    global_transforms: &Transforms,
    options: &ProgramOptions,
) -> ShaderSources {
    let mut defines = defines::merge(global_defines, &options.defines);
    let transforms = pragma::merge(global_transforms, &options.transforms);

    let (vertex, vertex_injected) = pragma::inject(vertex_template, &transforms);
    let (fragment, fragment_injected) = pragma::inject(fragment_template, &transforms);
    for key in vertex_injected.union(&fragment_injected) {
        defines.insert(pragma::transform_define(key), DefineValue::Bool(true));
    }

    let vertex = pragma::strip(&vertex);
    let fragment = pragma::strip(&fragment);

    let defines_block = defines::render(&defines);
    let vertex = format!("{defines_block}{vertex}");
    let fragment = format!("{defines_block}{fragment}");

    let vertex = declare_missing_uniforms(&vertex, &options.dependent_uniforms);
    let fragment = declare_missing_uniforms(&fragment, &options.dependent_uniforms);

    let header = match &options.name {
        Some(name) => format!("// Program {id}: {name}\n"),
        None => format!("// Program {id}\n"),
    };

    ShaderSources {
        vertex: format!("{header}{vertex}"),
        fragment: format!("{header}{fragment}"),
    }
}

/// A vertex/fragment program together with its cached uniform and attribute state.
///
/// Uniform values are cached on the host side. They can be set at any moment, including before
/// the first successful compilation, and are pushed to the driver again every time the program is
/// (re)compiled.
#[derive(Debug)]
pub struct GlProgram {
    id: ProgramId,
    vertex_template: String,
    fragment_template: String,
    options: ProgramOptions,
    handle: Option<ProgramHandle>,
    compiling: bool,
    sources: ShaderSources,
    uniforms: BTreeMap<String, UniformBinding>,
    attributes: HashMap<String, Option<u32>>,
}

impl GlProgram {
    pub(crate) fn new(
        id: ProgramId,
        vertex_template: impl Into<String>,
        fragment_template: impl Into<String>,
        options: ProgramOptions,
    ) -> Self {
        Self {
            id,
            vertex_template: vertex_template.into(),
            fragment_template: fragment_template.into(),
            options,
            handle: None,
            compiling: false,
            sources: ShaderSources::default(),
            uniforms: BTreeMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Program id.
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Program name, if set.
    pub fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    /// Whether the last compilation succeeded.
    pub fn is_compiled(&self) -> bool {
        self.handle.is_some()
    }

    /// Driver handle of the linked program.
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    /// Sources produced by the last compilation attempt.
    pub fn sources(&self) -> &ShaderSources {
        &self.sources
    }

    /// Cached uniform state.
    pub fn uniform_binding(&self, name: &str) -> Option<&UniformBinding> {
        self.uniforms.get(name)
    }

    /// Mutable access to the compilation options. Changes apply on the next compilation.
    pub fn options_mut(&mut self) -> &mut ProgramOptions {
        &mut self.options
    }

    pub(crate) fn compile(
        &mut self,
        context: &mut dyn GraphicsContext,
        global_defines: &Defines,
        global_transforms: &Transforms,
    ) -> Result<(), ShaderError> {
        if self.compiling {
            return Err(ShaderError::CompileInProgress(self.id));
        }

        self.compiling = true;
        let result = self.compile_sources(context, global_defines, global_transforms);
        self.compiling = false;

        result
    }

    fn compile_sources(
        &mut self,
        context: &mut dyn GraphicsContext,
        global_defines: &Defines,
        global_transforms: &Transforms,
    ) -> Result<(), ShaderError> {
        self.sources = compose(
            self.id,
            &self.vertex_template,
            &self.fragment_template,
            global_defines,
            global_transforms,
            &self.options,
        );

        if let Some(previous) = self.handle.take() {
            context.delete_program(previous);
        }
        let result = context.create_program(&self.sources.vertex, &self.sources.fragment);

        match result {
            Ok(handle) => {
                log::info!("Compiled program {} ({})", self.id, self.display_name());
                self.handle = Some(handle);
                self.refresh_uniforms(context);
                self.attributes.clear();
                Ok(())
            }
            Err(log) => {
                log::error!(
                    "Failed to compile program {} ({}): {log}",
                    self.id,
                    self.display_name()
                );
                for binding in self.uniforms.values_mut() {
                    binding.location = None;
                }

                Err(ShaderError::Compile {
                    program: self.id,
                    name: self.display_name().to_string(),
                    log,
                })
            }
        }
    }

    /// Resolves all known uniform locations again and pushes the cached values to the driver.
    pub fn refresh_uniforms(&mut self, context: &mut dyn GraphicsContext) {
        let Some(handle) = self.handle else {
            return;
        };

        context.use_program(handle);
        let mut texture_unit = 0;
        for (name, binding) in self.uniforms.iter_mut() {
            binding.location = context.uniform_location(handle, name);
            Self::upload(context, binding, &mut texture_unit);
        }
    }

    /// Sets several uniforms at once.
    ///
    /// Samplers are bound to consecutive texture units starting at `texture_unit`, or at 0 if it
    /// is not given. If the program is not compiled, values are only cached.
    pub fn set_uniforms<'a>(
        &mut self,
        context: &mut dyn GraphicsContext,
        values: impl IntoIterator<Item = (&'a str, UniformValue)>,
        texture_unit: Option<u32>,
    ) {
        let mut texture_unit = texture_unit.unwrap_or(0);
        if let Some(handle) = self.handle {
            context.use_program(handle);
        }

        for (name, value) in values {
            self.store(context, name, value, &mut texture_unit);
        }
    }

    /// Sets one uniform using an explicit setter method, as in `uniform("3f", "u_light", ..)`.
    pub fn uniform(
        &mut self,
        context: &mut dyn GraphicsContext,
        method: &str,
        name: &str,
        values: &[f32],
    ) -> Result<(), ShaderError> {
        let method: UniformMethod = method.parse()?;
        let value = UniformValue::from_method(method, values)?;
        if let Some(handle) = self.handle {
            context.use_program(handle);
        }

        let mut texture_unit = 0;
        self.store(context, name, value, &mut texture_unit);
        Ok(())
    }

    /// Location of a vertex attribute. Locations are cached until the next compilation.
    pub fn attribute(&mut self, context: &mut dyn GraphicsContext, name: &str) -> Option<u32> {
        let handle = self.handle?;
        *self
            .attributes
            .entry(name.to_string())
            .or_insert_with(|| context.attribute_location(handle, name))
    }

    /// Forgets all driver state after the graphics context was lost. Nothing is deleted through
    /// the context: the old handles are meaningless in a new one. Cached uniform values are kept
    /// and pushed again by the next compilation.
    pub fn invalidate(&mut self) {
        self.handle = None;
        self.attributes.clear();
        for binding in self.uniforms.values_mut() {
            binding.location = None;
        }
    }

    /// Releases the driver program. The program stays registered and can be compiled again.
    pub fn release(&mut self, context: &mut dyn GraphicsContext) {
        if let Some(handle) = self.handle.take() {
            context.delete_program(handle);
        }
        self.attributes.clear();
    }

    fn store(
        &mut self,
        context: &mut dyn GraphicsContext,
        name: &str,
        value: UniformValue,
        texture_unit: &mut u32,
    ) {
        let binding = self
            .uniforms
            .entry(name.to_string())
            .or_insert_with(|| UniformBinding {
                value: value.clone(),
                location: None,
            });
        binding.value = value;

        let Some(handle) = self.handle else {
            return;
        };

        if binding.location.is_none() {
            binding.location = context.uniform_location(handle, name);
        }

        Self::upload(context, binding, texture_unit);
    }

    fn upload(context: &mut dyn GraphicsContext, binding: &UniformBinding, texture_unit: &mut u32) {
        let Some(location) = binding.location else {
            return;
        };

        match &binding.value {
            UniformValue::Sampler(texture_name) => {
                let texture = context.texture(texture_name);
                context.bind_texture(*texture_unit, texture);
                context.set_uniform(location, &UniformValue::Int(*texture_unit as i32));
                *texture_unit += 1;
            }
            value => context.set_uniform(location, value),
        }
    }

    fn display_name(&self) -> &str {
        self.options.name.as_deref().unwrap_or("anonymous")
    }
}
