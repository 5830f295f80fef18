//! Error types used by the crate.

use serde::{Deserialize, Serialize};
use tessera_shader::ShaderError;
use thiserror::Error;

/// Tessera error type.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// Scene, layer, rule or style definition is malformed. Fatal to the scene compilation only.
    #[error("invalid scene configuration: {0}")]
    Configuration(String),
    /// Building a tile failed.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Shader program error.
    #[error(transparent)]
    Shader(#[from] ShaderError),
    /// Error decoding JSON data.
    #[error("failed to decode json: {0}")]
    Json(#[from] serde_json::Error),
}

impl TesseraError {
    /// Prefixes a configuration error with the name of the element it occurred in.
    pub(crate) fn in_context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::Configuration(message) => Self::Configuration(format!("{context}: {message}")),
            other => other,
        }
    }
}

/// Failure of a worker while building one tile. Other builds are not affected and the tile can be
/// requested again.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("failed to build tile {key}: {reason}")]
pub struct BuildError {
    /// Key of the tile.
    pub key: String,
    /// Description of the failure.
    pub reason: String,
}

impl BuildError {
    /// Creates a new error for the tile.
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
