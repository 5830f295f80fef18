//! In-memory [`GraphicsContext`] for headless builds and tests.

use std::collections::HashMap;

use regex::Regex;

use crate::context::{
    BufferHandle, GraphicsContext, ProgramHandle, TextureHandle, UniformLocation,
};
use crate::uniform::UniformValue;

/// Call recorded by the [`HeadlessContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    /// Program created.
    CreateProgram(ProgramHandle),
    /// Program deleted.
    DeleteProgram(ProgramHandle),
    /// Program made current.
    UseProgram(ProgramHandle),
    /// Uniform uploaded to the current program.
    SetUniform(ProgramHandle, String, UniformValue),
    /// Texture bound to a unit.
    BindTexture(u32, TextureHandle),
    /// Vertex buffer created with the given byte length.
    CreateBuffer(BufferHandle, usize),
    /// Vertex buffer deleted.
    DeleteBuffer(BufferHandle),
}

#[derive(Debug)]
struct HeadlessProgram {
    vertex: String,
    fragment: String,
    attributes: HashMap<String, u32>,
}

/// Graphics context that keeps everything in memory.
///
/// A uniform or attribute is considered active if its name appears as an identifier in one of the
/// program sources. Programs containing the configured failure marker are rejected with a
/// driver-like log.
#[derive(Debug, Default)]
pub struct HeadlessContext {
    next_handle: u32,
    fail_marker: Option<String>,
    programs: HashMap<ProgramHandle, HeadlessProgram>,
    current: Option<ProgramHandle>,
    locations: HashMap<UniformLocation, (ProgramHandle, String)>,
    values: HashMap<(ProgramHandle, String), UniformValue>,
    textures: HashMap<String, TextureHandle>,
    bound_textures: HashMap<u32, TextureHandle>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    attribute_lookups: usize,
    calls: Vec<GlCall>,
}

impl HeadlessContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes compilation fail for every program whose sources contain `marker`.
    pub fn fail_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Recorded calls in order.
    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    /// Handles of programs that were created and not deleted.
    pub fn live_programs(&self) -> Vec<ProgramHandle> {
        let mut handles: Vec<_> = self.programs.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Sources of a live program.
    pub fn program_sources(&self, program: ProgramHandle) -> Option<(&str, &str)> {
        self.programs
            .get(&program)
            .map(|p| (p.vertex.as_str(), p.fragment.as_str()))
    }

    /// Last value uploaded to the uniform of the program.
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<&UniformValue> {
        self.values.get(&(program, name.to_string()))
    }

    /// Texture currently bound to the unit.
    pub fn bound_texture(&self, unit: u32) -> Option<TextureHandle> {
        self.bound_textures.get(&unit).copied()
    }

    /// Texture created for the name, if any.
    pub fn texture_by_name(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(name).copied()
    }

    /// Contents of a live buffer.
    pub fn buffer(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Number of live buffers.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of attribute location queries issued so far.
    pub fn attribute_lookups(&self) -> usize {
        self.attribute_lookups
    }

    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn is_active(program: &HeadlessProgram, name: &str) -> bool {
        let Ok(identifier) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
            return false;
        };

        identifier.is_match(&program.vertex) || identifier.is_match(&program.fragment)
    }
}

impl GraphicsContext for HeadlessContext {
    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramHandle, String> {
        if let Some(marker) = &self.fail_marker {
            if vertex.contains(marker.as_str()) || fragment.contains(marker.as_str()) {
                return Err(format!("ERROR: 0:1: '{marker}' : syntax error"));
            }
        }

        let handle = ProgramHandle(self.next_handle());
        self.programs.insert(
            handle,
            HeadlessProgram {
                vertex: vertex.to_string(),
                fragment: fragment.to_string(),
                attributes: HashMap::new(),
            },
        );
        self.calls.push(GlCall::CreateProgram(handle));

        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.locations.retain(|_, (p, _)| *p != program);
        self.values.retain(|(p, _), _| *p != program);
        if self.current == Some(program) {
            self.current = None;
        }
        self.calls.push(GlCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current = Some(program);
        self.calls.push(GlCall::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let active = Self::is_active(self.programs.get(&program)?, name);
        if !active {
            return None;
        }

        if let Some((location, _)) = self
            .locations
            .iter()
            .find(|(_, (p, n))| *p == program && n == name)
        {
            return Some(*location);
        }

        let location = UniformLocation(self.next_handle());
        self.locations
            .insert(location, (program, name.to_string()));
        Some(location)
    }

    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.attribute_lookups += 1;
        let program = self.programs.get_mut(&program)?;
        if !Self::is_active(program, name) {
            return None;
        }

        let next = program.attributes.len() as u32;
        Some(*program.attributes.entry(name.to_string()).or_insert(next))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some((program, name)) = self.locations.get(&location).cloned() else {
            log::warn!("Uniform location {location:?} does not exist");
            return;
        };

        if self.current != Some(program) {
            log::warn!("Uniform {name} set while its program is not current");
            return;
        }

        self.calls
            .push(GlCall::SetUniform(program, name.clone(), value.clone()));
        self.values.insert((program, name), value.clone());
    }

    fn texture(&mut self, name: &str) -> TextureHandle {
        if let Some(texture) = self.textures.get(name) {
            return *texture;
        }

        let texture = TextureHandle(self.next_handle());
        self.textures.insert(name.to_string(), texture);
        texture
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.bound_textures.insert(unit, texture);
        self.calls.push(GlCall::BindTexture(unit, texture));
    }

    fn create_vertex_buffer(&mut self, data: &[u8]) -> BufferHandle {
        let buffer = BufferHandle(self.next_handle());
        self.buffers.insert(buffer, data.to_vec());
        self.calls.push(GlCall::CreateBuffer(buffer, data.len()));
        buffer
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.calls.push(GlCall::DeleteBuffer(buffer));
    }
}
