//! Shader program composition for the Tessera renderer.
//!
//! A [`GlProgram`] is created from a vertex and a fragment template. Before the templates are
//! handed to the graphics driver they go through a fixed composition pipeline:
//!
//! * `#define` tables (global ones from the [`ShaderRegistry`] and per-program ones) are merged,
//! * named code blocks ("transforms") are substituted at `#pragma tessera: <key>` lines,
//! * injection pragmas that nobody provided a transform for are stripped,
//! * the defines block is prepended,
//! * declarations are synthesized for dependent uniforms that are used but never declared,
//! * an identifying comment is added on top.
//!
//! The driver itself is reached only through the [`GraphicsContext`] trait, so the same
//! programs can be compiled against a real GL context or against the in-memory
//! [`HeadlessContext`].
//!
//! ```
//! use tessera_shader::{HeadlessContext, ProgramOptions, ShaderRegistry};
//!
//! let mut context = HeadlessContext::new();
//! let mut registry = ShaderRegistry::new();
//! registry.add_transform("color", "color.rgb *= 0.5;");
//!
//! let id = registry.create_program(
//!     "void main() { gl_Position = vec4(0.0); }",
//!     "void main() { vec4 color = vec4(1.0);\n#pragma tessera: color\ngl_FragColor = color; }",
//!     ProgramOptions::named("dimmed"),
//! );
//! registry.compile(&mut context, id)?;
//! # Ok::<(), tessera_shader::ShaderError>(())
//! ```

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

mod context;
pub mod defines;
pub mod error;
pub mod headless;
pub mod pragma;
mod program;
mod registry;
pub mod uniform;

pub use context::{BufferHandle, GraphicsContext, ProgramHandle, TextureHandle, UniformLocation};
pub use defines::{DefineValue, Defines};
pub use error::ShaderError;
pub use headless::HeadlessContext;
pub use pragma::{TransformSource, Transforms};
pub use program::{compose, GlProgram, ProgramId, ProgramOptions, ShaderSources};
pub use registry::ShaderRegistry;
pub use uniform::{UniformBinding, UniformMethod, UniformValue};
