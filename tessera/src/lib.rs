//! Tessera turns tiled GeoJSON into per-style vertex buffers and draws them with composed shader
//! programs.
//!
//! # Main components
//!
//! * A [`Scene`] is the compiled form of a scene configuration: data [sources](scene::SourceConfig),
//!   [layers](layer::Layer) with their trees of style [rules](style::rule::RuleNode), and named
//!   [styles](style::Style).
//! * [`build::build_tile`] is the worker-side pipeline: for every layer it resolves the features
//!   with the [resolver], matches them against the rules, parses the matched rules into concrete
//!   style values and feeds them into the [builders] that produce one vertex buffer per style. It
//!   never touches the graphics context.
//! * The [`WorkerPool`](worker::WorkerPool) runs builds on background tasks and posts one
//!   response per request.
//! * The [`TileManager`](tile_manager::TileManager) lives on the main thread. It tracks visible
//!   tiles, discards stale build results and uploads fresh buffers through a
//!   [`GraphicsContext`](tessera_shader::GraphicsContext).
//! * [`StylePrograms`](render::StylePrograms) compiles one shader program per style with
//!   `tessera_shader` and produces the draw list for the finalized tiles.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod build;
pub mod builders;
mod color;
pub mod error;
pub mod geometry;
pub mod layer;
mod messenger;
pub mod render;
pub mod resolver;
pub mod scene;
pub mod style;
pub mod tile;
pub mod tile_manager;
pub mod worker;

pub use color::Color;
pub use error::{BuildError, TesseraError};
pub use messenger::Messenger;
pub use scene::Scene;

// Reexport the shader crate
pub use tessera_shader;
