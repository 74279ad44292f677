//! # nsbox-container
//!
//! A control layer that presents each OS-level container as an
//! independently usable handle while serializing all access to the
//! underlying native engine, whose per-process global state is not safe
//! for concurrent mutation.
//!
//! - [`Container`]: the handle binding an immutable identity (name +
//!   config-store path) to an engine session, with lifecycle transitions
//!   and a blocking, timeout-bounded [`Container::wait`]
//! - a process-wide lock registry keyed by identity: operations on one
//!   identity are totally ordered, operations on different identities
//!   interleave freely
//! - [`Container::run_command`] / [`Container::run_command_no_wait`]:
//!   process attachment into a configurable namespace subset under
//!   [`AttachOptions`]
//! - clone/snapshot/restore lineage under [`CloneOptions`], including
//!   dependency protection for snapshot-backed clones
//!
//! ```no_run
//! use nsbox_container::{AttachOptions, Container};
//! use nsbox_engine::{mock::MockEngine, ContainerState, Engine};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> nsbox_container::Result<()> {
//! let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
//! let container = Container::new(Arc::clone(&engine), "lorem")?;
//!
//! container.start()?;
//! assert!(container.wait(ContainerState::Running, Duration::from_secs(30)));
//!
//! let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "exit 0".to_string()];
//! let ok = container.run_command(&argv, &AttachOptions::default())?;
//! assert!(ok);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod attach;
pub mod error;
pub mod handle;
pub mod lineage;
mod locking;

pub use attach::AttachOptions;
pub use error::{ContainerError, Result};
pub use handle::{Container, Verbosity};
pub use lineage::CloneOptions;

// Boundary vocabulary, re-exported for callers that only depend on this
// crate.
pub use nsbox_engine::{
    Arch, BackendStore, ContainerIdentity, ContainerState, Engine, LogLevel, Namespaces, Snapshot,
};

use std::path::Path;
use std::sync::Arc;

/// Names of all defined containers under `config_path` (the engine default
/// path when `None`).
#[must_use]
pub fn defined_container_names(engine: &dyn Engine, config_path: Option<&Path>) -> Vec<String> {
    let path = config_path.map_or_else(|| engine.default_config_path(), Path::to_path_buf);
    engine.defined_names(&path)
}

/// Names of all active (running or frozen) containers under `config_path`.
#[must_use]
pub fn active_container_names(engine: &dyn Engine, config_path: Option<&Path>) -> Vec<String> {
    let path = config_path.map_or_else(|| engine.default_config_path(), Path::to_path_buf);
    engine.active_names(&path)
}

/// Handles for all defined containers under `config_path`.
///
/// # Errors
///
/// [`ContainerError::InvalidName`] if the engine reports a name this layer
/// refuses to bind.
pub fn defined_containers(
    engine: &Arc<dyn Engine>,
    config_path: Option<&Path>,
) -> Result<Vec<Container>> {
    let path = config_path.map_or_else(|| engine.default_config_path(), Path::to_path_buf);
    engine
        .defined_names(&path)
        .into_iter()
        .map(|name| Container::with_config_path(Arc::clone(engine), name, path.clone()))
        .collect()
}

/// Handles for all active containers under `config_path`.
///
/// # Errors
///
/// [`ContainerError::InvalidName`] if the engine reports a name this layer
/// refuses to bind.
pub fn active_containers(
    engine: &Arc<dyn Engine>,
    config_path: Option<&Path>,
) -> Result<Vec<Container>> {
    let path = config_path.map_or_else(|| engine.default_config_path(), Path::to_path_buf);
    engine
        .active_names(&path)
        .into_iter()
        .map(|name| Container::with_config_path(Arc::clone(engine), name, path.clone()))
        .collect()
}
