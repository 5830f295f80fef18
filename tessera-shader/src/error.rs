//! Error types used by the crate.

use thiserror::Error;

use crate::program::ProgramId;
use crate::uniform::UniformMethod;

/// Shader subsystem error type.
#[derive(Debug, Error)]
pub enum ShaderError {
    /// The driver rejected the composed sources. The program is left uncompiled.
    #[error("failed to compile program {program} ({name}): {log}")]
    Compile {
        /// Program that failed.
        program: ProgramId,
        /// Program name, empty if the program is anonymous.
        name: String,
        /// Diagnostic reported by the driver.
        log: String,
    },
    /// Compilation of the program was requested while it was already being compiled.
    #[error("program {0} is already being compiled")]
    CompileInProgress(ProgramId),
    /// Program id is not registered.
    #[error("program {0} is not registered")]
    UnknownProgram(ProgramId),
    /// Uniform method name cannot be parsed.
    #[error("unknown uniform method '{0}'")]
    UnknownUniformMethod(String),
    /// Number of values does not correspond to the uniform method.
    #[error("uniform method {method:?} expects {expected} values, got {actual}")]
    UniformArity {
        /// Requested method.
        method: UniformMethod,
        /// Number of values the method consumes.
        expected: usize,
        /// Number of values given.
        actual: usize,
    },
}
