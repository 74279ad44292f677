//! # nsbox-engine
//!
//! The boundary between the nsbox control layer and the native container
//! engine. This crate defines:
//!
//! - the [`Engine`] trait: every operation the control layer consumes from
//!   the engine, at the granularity the engine exposes it
//! - the shared vocabulary crossing that boundary (identity, states,
//!   backing stores, snapshots, attach requests)
//! - a tolerant [version comparator](version::version_at_least) for
//!   feature-gating on decorated engine version strings
//! - [`MockEngine`](mock::MockEngine), an in-memory engine used by the
//!   control layer's test suite
//!
//! The engine's per-process global state is not safe for concurrent
//! mutation. The control layer guarantees that no two calls for one
//! identity are ever in flight at once; `Engine` implementations may assume
//! it and [`mock::MockEngine`] actively asserts it.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod attach;
pub mod error;
pub mod identity;
pub mod log;
pub mod mock;
pub mod snapshot;
pub mod state;
pub mod version;

pub use attach::{Arch, AttachSpec, Namespaces};
pub use error::{EngineError, Result};
pub use identity::ContainerIdentity;
pub use log::LogLevel;
pub use snapshot::{CloneRequest, Snapshot};
pub use state::{BackendStore, ContainerState};
pub use version::{parse_version, version_at_least};

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contract of the native container engine.
///
/// All methods are synchronous: each is bounded by a single native engine
/// call. Callers serialize per identity; implementations never see two
/// overlapping calls for the same identity.
///
/// "Not found" (the container is not defined) is always distinguished from
/// "found but the engine rejected the operation"; callers rely on the
/// distinction to decide whether to define the container first.
pub trait Engine: Send + Sync {
    /// Engine version string, possibly decorated (`"5.0.0~git..."`).
    fn version(&self) -> String;

    /// Default config-store path for containers without an explicit one.
    fn default_config_path(&self) -> PathBuf;

    /// Defines a new (stopped) container.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the identity is already defined.
    fn define(&self, id: &ContainerIdentity) -> Result<()>;

    /// Whether the container is defined.
    fn defined(&self, id: &ContainerIdentity) -> bool;

    /// Removes the container's definition and backing storage.
    ///
    /// # Errors
    ///
    /// `DependentClones` (with no partial cleanup) while snapshot-backed
    /// clones depend on this container; `NotFound` if undefined.
    fn destroy(&self, id: &ContainerIdentity) -> Result<()>;

    /// Like [`Engine::destroy`], but first destroys the container's own
    /// snapshots (explicit cascading consent from the caller).
    ///
    /// # Errors
    ///
    /// Same as [`Engine::destroy`].
    fn destroy_with_snapshots(&self, id: &ContainerIdentity) -> Result<()>;

    /// Current execution state, freshly queried.
    ///
    /// # Errors
    ///
    /// `NotFound` if the container is not defined.
    fn state(&self, id: &ContainerIdentity) -> Result<ContainerState>;

    /// Starts the container.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected` (e.g. already running).
    fn start(&self, id: &ContainerIdentity) -> Result<()>;

    /// Forcibly stops the container.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn stop(&self, id: &ContainerIdentity) -> Result<()>;

    /// Requests a clean shutdown, waiting up to `timeout` before giving up.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn shutdown(&self, id: &ContainerIdentity, timeout: Duration) -> Result<()>;

    /// Reboots the container.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn reboot(&self, id: &ContainerIdentity) -> Result<()>;

    /// Freezes all of the container's processes.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn freeze(&self, id: &ContainerIdentity) -> Result<()>;

    /// Thaws a frozen container.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn unfreeze(&self, id: &ContainerIdentity) -> Result<()>;

    /// Host-visible pid of the container's init process, if running.
    fn init_pid(&self, id: &ContainerIdentity) -> Option<i32>;

    /// File descriptor of the container's console tty.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Rejected` or `Unsupported`.
    fn console_fd(&self, id: &ContainerIdentity, tty: u32) -> Result<RawFd>;

    /// Whether the calling process may control the container.
    fn may_control(&self, id: &ContainerIdentity) -> bool;

    /// Values of a config key. Keys are list-valued: a key may repeat.
    fn config_item(&self, id: &ContainerIdentity, key: &str) -> Vec<String>;

    /// Appends/sets a config entry.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected` (invalid key or value).
    fn set_config_item(&self, id: &ContainerIdentity, key: &str, value: &str) -> Result<()>;

    /// Clears all values of a config key.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn clear_config_item(&self, id: &ContainerIdentity, key: &str) -> Result<()>;

    /// Config keys available under a prefix.
    fn config_keys(&self, id: &ContainerIdentity, prefix: &str) -> Vec<String>;

    /// Values of a cgroup controller entry.
    fn cgroup_item(&self, id: &ContainerIdentity, key: &str) -> Vec<String>;

    /// Sets a cgroup controller entry.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn set_cgroup_item(&self, id: &ContainerIdentity, key: &str, value: &str) -> Result<()>;

    /// Per-container log file, if configured.
    fn log_file(&self, id: &ContainerIdentity) -> Option<PathBuf>;

    /// Sets the per-container log file.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn set_log_file(&self, id: &ContainerIdentity, path: &Path) -> Result<()>;

    /// Per-container log level.
    fn log_level(&self, id: &ContainerIdentity) -> LogLevel;

    /// Sets the per-container log level.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn set_log_level(&self, id: &ContainerIdentity, level: LogLevel) -> Result<()>;

    /// Names of all defined containers under a config-store path.
    fn defined_names(&self, config_path: &Path) -> Vec<String>;

    /// Names of all active (running or frozen) containers under a
    /// config-store path.
    fn active_names(&self, config_path: &Path) -> Vec<String>;

    /// Launches `argv` inside the container's namespace subset and returns
    /// the host-visible pid immediately, without waiting for it to exit.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Rejected` (container not in a runnable state) or
    /// `Launch` (namespace join, identity switch, working directory or
    /// spawn failure).
    fn attach(&self, id: &ContainerIdentity, argv: &[String], spec: &AttachSpec) -> Result<i32>;

    /// One-shot execution: runs `argv` inside an otherwise-stopped
    /// container and returns its captured stdout.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Rejected` or `Launch`.
    fn execute(&self, id: &ContainerIdentity, argv: &[String]) -> Result<Vec<u8>>;

    /// Clones `src` into `dest` per the request.
    ///
    /// # Errors
    ///
    /// `NotFound` (source), `AlreadyExists` (destination) or `Rejected`.
    fn clone_container(
        &self,
        src: &ContainerIdentity,
        dest: &ContainerIdentity,
        request: &CloneRequest,
    ) -> Result<()>;

    /// Creates a snapshot under the next unused ordinal name.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Rejected`.
    fn snapshot_create(&self, id: &ContainerIdentity) -> Result<Snapshot>;

    /// Lists the container's snapshots.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    fn snapshot_list(&self, id: &ContainerIdentity) -> Result<Vec<Snapshot>>;

    /// Materializes `dest` from the named snapshot of `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` (source or snapshot), `AlreadyExists` (destination other
    /// than the source itself) or `Rejected`.
    fn snapshot_restore(
        &self,
        id: &ContainerIdentity,
        name: &str,
        dest: &ContainerIdentity,
    ) -> Result<()>;

    /// Destroys one named snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` (container or snapshot).
    fn snapshot_destroy(&self, id: &ContainerIdentity, name: &str) -> Result<()>;

    /// Destroys all of the container's snapshots in one engine call.
    ///
    /// # Errors
    ///
    /// `Unsupported` on engine versions lacking bulk destruction (never a
    /// silent no-op); `NotFound`.
    fn snapshot_destroy_all(&self, id: &ContainerIdentity) -> Result<()>;
}
