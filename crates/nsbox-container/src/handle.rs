//! The container handle: identity, engine session binding and lifecycle.

use crate::error::{ContainerError, Result};
use crate::locking;
use nsbox_engine::{ContainerIdentity, ContainerState, Engine, LogLevel};
use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Interval between point queries inside [`Container::wait`]. Each poll
/// takes the identity lock only for the duration of one state query, so a
/// multi-second wait never starves other callers on the same identity.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Verbosity of the handle's log configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    /// Suppress engine output.
    #[default]
    Quiet,
    /// Verbose engine output.
    Verbose,
}

#[derive(Debug, Default, Clone)]
struct LogConfig {
    file: Option<PathBuf>,
    verbosity: Verbosity,
    level: Option<LogLevel>,
}

/// A handle to one container.
///
/// The handle binds an immutable [`ContainerIdentity`] to an engine
/// session. Any number of handles may exist for the same identity, from any
/// number of threads; every mutating operation acquires the identity's lock
/// registry entry for the duration of the underlying engine call, so
/// operations on one identity are totally ordered while operations on
/// different identities interleave freely.
///
/// State is never cached: it can change behind this process's back (the
/// container's init exiting, another process freezing it), so every query
/// re-reads the engine.
///
/// The engine session binding is released exactly once, on explicit
/// [`release`](Container::release) or on drop, whichever comes first.
pub struct Container {
    identity: ContainerIdentity,
    engine: Arc<dyn Engine>,
    log: LogConfig,
    released: bool,
}

impl Container {
    /// Creates a handle under the engine's default config-store path.
    ///
    /// The container need not be defined yet; use
    /// [`defined`](Container::defined) to check.
    ///
    /// # Errors
    ///
    /// [`ContainerError::InvalidName`] for empty names or names containing
    /// path separators.
    pub fn new(engine: Arc<dyn Engine>, name: impl Into<String>) -> Result<Self> {
        let config_path = engine.default_config_path();
        Self::with_config_path(engine, name, config_path)
    }

    /// Creates a handle under an explicit config-store path.
    ///
    /// # Errors
    ///
    /// [`ContainerError::InvalidName`] for empty names or names containing
    /// path separators.
    pub fn with_config_path(
        engine: Arc<dyn Engine>,
        name: impl Into<String>,
        config_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(ContainerError::InvalidName(name));
        }
        let identity = ContainerIdentity::new(name, config_path);
        locking::retain(&identity);
        Ok(Self {
            identity,
            engine,
            log: LogConfig::default(),
            released: false,
        })
    }

    /// Returns the container name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    /// Returns the config-store path this handle is bound to.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        self.identity.config_path()
    }

    /// Returns the immutable identity.
    #[must_use]
    pub fn identity(&self) -> &ContainerIdentity {
        &self.identity
    }

    /// Releases the engine session binding.
    ///
    /// Safe to call more than once; only the first call releases. Dropping
    /// the handle releases implicitly if this was never called.
    pub fn release(&mut self) {
        // `&mut self` makes the flag check race-free; taking the identity
        // lock here would recreate the registry entry being released.
        if !std::mem::replace(&mut self.released, true) {
            locking::release(&self.identity);
            debug!(container = %self.identity, "handle released");
        }
    }

    /// Runs an engine call under the identity lock, attaching operation
    /// context to any error.
    pub(crate) fn engine_call<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn Engine) -> nsbox_engine::Result<T>,
    ) -> Result<T> {
        let _guard = locking::lock(&self.identity);
        f(self.engine.as_ref())
            .map_err(|e| ContainerError::from_engine(operation, &self.identity.to_string(), e))
    }

    /// Runs an infallible engine query under the identity lock.
    fn engine_query<T>(&self, f: impl FnOnce(&dyn Engine) -> T) -> T {
        let _guard = locking::lock(&self.identity);
        f(self.engine.as_ref())
    }

    // ----- state machine ---------------------------------------------------

    /// Whether the container is defined in the engine.
    #[must_use]
    pub fn defined(&self) -> bool {
        self.engine_query(|e| e.defined(&self.identity))
    }

    /// Current execution state, freshly queried from the engine.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] if the container is not defined — a
    /// distinct outcome from a defined container whose state the engine
    /// reports as indeterminate ([`ContainerState::Invalid`]).
    pub fn state(&self) -> Result<ContainerState> {
        self.engine_call("state", |e| e.state(&self.identity))
    }

    /// Whether the container is currently running.
    #[must_use]
    pub fn running(&self) -> bool {
        matches!(self.state(), Ok(ContainerState::Running))
    }

    /// Host-visible pid of the container's init process, or `None` when not
    /// running.
    #[must_use]
    pub fn init_pid(&self) -> Option<i32> {
        self.engine_query(|e| e.init_pid(&self.identity))
    }

    /// Whether the calling process may control the container.
    #[must_use]
    pub fn may_control(&self) -> bool {
        self.engine_query(|e| e.may_control(&self.identity))
    }

    /// Blocks until the container reaches `target` or `timeout` elapses,
    /// returning whether the target was reached.
    ///
    /// A zero timeout polls exactly once without blocking; a timeout too
    /// large to represent as a deadline (e.g. [`Duration::MAX`]) waits
    /// indefinitely. Expiry is a boolean outcome, not an error. Each
    /// iteration holds the identity lock only for one point query and
    /// re-validates after every wake; query failures (e.g. the container
    /// was undefined mid-wait) count as "target not reached" and the poll
    /// continues until the deadline.
    #[must_use]
    pub fn wait(&self, target: ContainerState, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.state().is_ok_and(|s| s == target) {
                return true;
            }
            if timeout.is_zero() {
                return false;
            }
            let interval = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    WAIT_POLL_INTERVAL.min(deadline - now)
                }
                None => WAIT_POLL_INTERVAL,
            };
            std::thread::sleep(interval);
        }
    }

    // ----- lifecycle transitions -------------------------------------------

    /// Starts the container. Expected path: STOPPED → STARTING → RUNNING.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection (e.g. already
    /// running).
    pub fn start(&self) -> Result<()> {
        debug!(container = %self.identity, "starting");
        self.engine_call("start", |e| e.start(&self.identity))
    }

    /// Forcibly stops the container. Expected path: RUNNING → STOPPING →
    /// STOPPED.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn stop(&self) -> Result<()> {
        debug!(container = %self.identity, "stopping");
        self.engine_call("stop", |e| e.stop(&self.identity))
    }

    /// Requests a clean shutdown, giving the container up to `timeout` to
    /// comply.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn shutdown(&self, timeout: Duration) -> Result<()> {
        debug!(container = %self.identity, timeout_secs = timeout.as_secs(), "shutting down");
        self.engine_call("shutdown", |e| e.shutdown(&self.identity, timeout))
    }

    /// Reboots the container. Expected path: RUNNING → STARTING → RUNNING.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn reboot(&self) -> Result<()> {
        debug!(container = %self.identity, "rebooting");
        self.engine_call("reboot", |e| e.reboot(&self.identity))
    }

    /// Freezes all of the container's processes. Expected path: RUNNING →
    /// FREEZING → FROZEN.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn freeze(&self) -> Result<()> {
        debug!(container = %self.identity, "freezing");
        self.engine_call("freeze", |e| e.freeze(&self.identity))
    }

    /// Thaws a frozen container. Expected path: FROZEN → THAWED → RUNNING.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn unfreeze(&self) -> Result<()> {
        debug!(container = %self.identity, "unfreezing");
        self.engine_call("unfreeze", |e| e.unfreeze(&self.identity))
    }

    // ----- config and cgroup pass-through ----------------------------------

    /// Values of a config key (list-valued; a key may repeat).
    #[must_use]
    pub fn config_item(&self, key: &str) -> Vec<String> {
        self.engine_query(|e| e.config_item(&self.identity, key))
    }

    /// Sets a config entry.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn set_config_item(&self, key: &str, value: &str) -> Result<()> {
        self.engine_call("set_config_item", |e| {
            e.set_config_item(&self.identity, key, value)
        })
    }

    /// Clears all values of a config key.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn clear_config_item(&self, key: &str) -> Result<()> {
        self.engine_call("clear_config_item", |e| {
            e.clear_config_item(&self.identity, key)
        })
    }

    /// Config keys available under a prefix.
    #[must_use]
    pub fn config_keys(&self, prefix: &str) -> Vec<String> {
        self.engine_query(|e| e.config_keys(&self.identity, prefix))
    }

    /// Values of a cgroup controller entry.
    #[must_use]
    pub fn cgroup_item(&self, key: &str) -> Vec<String> {
        self.engine_query(|e| e.cgroup_item(&self.identity, key))
    }

    /// Sets a cgroup controller entry.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn set_cgroup_item(&self, key: &str, value: &str) -> Result<()> {
        self.engine_call("set_cgroup_item", |e| {
            e.set_cgroup_item(&self.identity, key, value)
        })
    }

    /// File descriptor of the container's console tty.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`], an engine rejection, or
    /// [`ContainerError::Unsupported`].
    pub fn console_fd(&self, tty: u32) -> Result<RawFd> {
        self.engine_call("console_fd", |e| e.console_fd(&self.identity, tty))
    }

    // ----- log configuration -----------------------------------------------
    //
    // Mutated independently of execution state; the handle mirrors what it
    // last set so the accessors do not need an engine round trip.

    /// The per-container log file last configured through this handle.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log.file.as_deref()
    }

    /// Sets the per-container log file.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn set_log_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.engine_call("set_log_file", |e| e.set_log_file(&self.identity, &path))?;
        self.log.file = Some(path);
        Ok(())
    }

    /// The log level last configured through this handle, falling back to
    /// the engine's report.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log
            .level
            .unwrap_or_else(|| self.engine_query(|e| e.log_level(&self.identity)))
    }

    /// Sets the per-container log level.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn set_log_level(&mut self, level: LogLevel) -> Result<()> {
        self.engine_call("set_log_level", |e| e.set_log_level(&self.identity, level))?;
        self.log.level = Some(level);
        Ok(())
    }

    /// Handle-local verbosity.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        self.log.verbosity
    }

    /// Sets handle-local verbosity.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.log.verbosity = verbosity;
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("identity", &self.identity)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
