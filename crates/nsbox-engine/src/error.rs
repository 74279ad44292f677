//! Error types for engine operations.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the native container engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No container with this identity is defined.
    #[error("container not found: {0}")]
    NotFound(String),

    /// A container with this identity is already defined.
    #[error("container already exists: {0}")]
    AlreadyExists(String),

    /// The operation is not available on the running engine version.
    ///
    /// Callers are expected to treat this as a first-class outcome (skip or
    /// fall back), not as a generic failure.
    #[error("operation {operation} not supported by engine version {version}")]
    Unsupported {
        /// The attempted operation.
        operation: &'static str,
        /// The running engine version string.
        version: String,
    },

    /// Snapshot-backed clones still depend on the container.
    #[error("{count} snapshot-backed clone(s) depend on container {name}")]
    DependentClones {
        /// Name of the container that cannot be destroyed.
        name: String,
        /// Number of dependent clones.
        count: usize,
    },

    /// A process could not be launched inside the container at all.
    ///
    /// Distinct from a launched process exiting non-zero, which is not an
    /// error.
    #[error("failed to launch process in {name}: {reason}")]
    Launch {
        /// Name of the target container.
        name: String,
        /// Engine-provided launch failure detail.
        reason: String,
    },

    /// The engine rejected an operation (invalid config, wrong state, ...).
    #[error("engine rejected {operation} on {name}: {reason}")]
    Rejected {
        /// The attempted operation.
        operation: &'static str,
        /// Name of the target container.
        name: String,
        /// Engine-provided rejection detail.
        reason: String,
    },

    /// I/O error talking to the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
