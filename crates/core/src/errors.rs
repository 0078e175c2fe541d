//! Error types and handling
//!
//! This module provides the error taxonomy for the launcher core. Every failure
//! that reaches the process boundary is one of these variants; the binary maps
//! them onto exit codes.

use thiserror::Error;

/// Main error enum for the launcher core
#[derive(Error, Debug)]
pub enum DockhandError {
    /// The project directory could not be resolved to an absolute path
    #[error("Failed to resolve project directory '{path}': {reason}")]
    PathResolution { path: String, reason: String },

    /// An external runtime command exited with a nonzero status
    #[error("{label} failed with exit code {exit_code}")]
    CommandFailed {
        label: String,
        exit_code: i32,
        tail_output: Vec<String>,
    },

    /// A required host program is missing
    #[error("{program} is not installed or not on PATH. {guidance}")]
    MissingPrerequisite { program: String, guidance: String },

    /// Launcher configuration file could not be parsed
    #[error("Invalid configuration in {path}: {message}")]
    Config { path: String, message: String },

    /// The user interrupted a running command
    #[error("Interrupted")]
    Interrupted,

    /// Container runtime errors that are not plain command failures
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Filesystem I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DockhandError {
    /// Process exit code to use when this error reaches the process boundary
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingPrerequisite { .. } => 127,
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Convenience type alias for Results with DockhandError
pub type Result<T> = std::result::Result<T, DockhandError>;
