use crate::uniform::UniformValue;

/// Driver-side program object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

/// Storage location of a uniform inside a linked program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Driver-side texture object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Driver-side vertex buffer object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Operations the renderer needs from a graphics context.
///
/// Only the main thread owns a context. Everything that runs on worker tasks must be expressible
/// without it.
pub trait GraphicsContext {
    /// Compiles both stages and links them into a program. On failure returns the driver log.
    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramHandle, String>;

    /// Releases the program object.
    fn delete_program(&mut self, program: ProgramHandle);

    /// Makes the program current for subsequent uniform uploads and draws.
    fn use_program(&mut self, program: ProgramHandle);

    /// Looks up a uniform. Returns `None` if the program has no active uniform with this name.
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// Looks up a vertex attribute. Returns `None` if the attribute is not active.
    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32>;

    /// Uploads a value to a uniform of the current program. Samplers arrive here already
    /// resolved to [`UniformValue::Int`] texture units.
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    /// Returns the texture registered under `name`, creating an empty one if there is none.
    fn texture(&mut self, name: &str) -> TextureHandle;

    /// Binds the texture to the given texture unit.
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    /// Uploads vertex data into a new buffer.
    fn create_vertex_buffer(&mut self, data: &[u8]) -> BufferHandle;

    /// Releases the buffer.
    fn delete_buffer(&mut self, buffer: BufferHandle);
}
