//! Error types for control-layer operations.

use nsbox_engine::EngineError;
use thiserror::Error;

/// Result type alias for control-layer operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors surfaced by container handle operations.
///
/// Two outcomes are deliberately *not* errors: a wait that expires (boolean
/// result of [`Container::wait`](crate::Container::wait)) and a launched
/// process exiting non-zero (boolean result of
/// [`Container::run_command`](crate::Container::run_command)). Lock token
/// misuse is a defect, caught by debug assertions rather than modeled here.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container name is not usable as an identity.
    #[error("invalid container name: {0:?}")]
    InvalidName(String),

    /// No container with this identity is defined.
    #[error("container not found: {0}")]
    NotFound(String),

    /// A container with this identity is already defined.
    #[error("container already exists: {0}")]
    AlreadyExists(String),

    /// The operation is unavailable on the running engine version.
    ///
    /// A distinct, recognizable kind so callers can skip instead of fail.
    #[error("operation {operation} not supported by engine version {version}")]
    Unsupported {
        /// The attempted operation.
        operation: &'static str,
        /// The running engine version string.
        version: String,
    },

    /// Snapshot-backed clones still depend on the container.
    #[error("cannot destroy {name}: {count} snapshot-backed clone(s) depend on it")]
    DependentClones {
        /// Name of the container that cannot be destroyed.
        name: String,
        /// Number of dependent clones.
        count: usize,
    },

    /// A process could not be launched inside the container at all.
    #[error("failed to launch process in {name}: {reason}")]
    Launch {
        /// Name of the target container.
        name: String,
        /// Launch failure detail.
        reason: String,
    },

    /// The engine rejected the operation.
    #[error("{operation} failed for container {container}: {source}")]
    Engine {
        /// The attempted operation.
        operation: &'static str,
        /// Identity of the target container.
        container: String,
        /// The underlying engine error.
        #[source]
        source: EngineError,
    },

    /// I/O error on the host side (e.g. reaping an attached process).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Lifts an engine error into the control-layer taxonomy, promoting the
    /// first-class kinds and wrapping the rest with operation context.
    pub(crate) fn from_engine(operation: &'static str, container: &str, e: EngineError) -> Self {
        match e {
            EngineError::NotFound(name) => Self::NotFound(name),
            EngineError::AlreadyExists(name) => Self::AlreadyExists(name),
            EngineError::Unsupported { operation, version } => {
                Self::Unsupported { operation, version }
            }
            EngineError::DependentClones { name, count } => {
                Self::DependentClones { name, count }
            }
            EngineError::Launch { name, reason } => Self::Launch { name, reason },
            other => Self::Engine {
                operation,
                container: container.to_string(),
                source: other,
            },
        }
    }
}
