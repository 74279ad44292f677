//! In-memory engine used by the control-layer test suite.
//!
//! [`MockEngine`] models definitions, state transitions, config stores and
//! snapshot lineage entirely in memory, and panics if two calls for the
//! same identity are ever in flight at once — the contract the control
//! layer's lock registry must uphold. Attach and one-shot execution spawn
//! real host processes so environment, working-directory and exit-status
//! semantics are exercised for real.

use crate::attach::AttachSpec;
use crate::error::{EngineError, Result};
use crate::identity::ContainerIdentity;
use crate::log::LogLevel;
use crate::snapshot::{CloneRequest, Snapshot};
use crate::state::ContainerState;
use crate::version::version_at_least;
use crate::Engine;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Snapshot of a container's definition at snapshot time.
#[derive(Debug, Clone)]
struct StoredSnapshot {
    meta: Snapshot,
    state: ContainerState,
    config: Vec<(String, String)>,
    hostname: String,
    mac: String,
}

#[derive(Debug, Clone)]
struct MockContainer {
    state: ContainerState,
    init_pid: Option<i32>,
    config: Vec<(String, String)>,
    cgroup: Vec<(String, String)>,
    log_file: Option<PathBuf>,
    log_level: LogLevel,
    hostname: String,
    mac: String,
    snapshots: Vec<StoredSnapshot>,
    /// Source this container is a snapshot-backed (copy-on-write) clone of.
    backed_by: Option<ContainerIdentity>,
}

impl MockContainer {
    fn new(name: &str, mac: String) -> Self {
        Self {
            state: ContainerState::Stopped,
            init_pid: None,
            config: vec![("uts.name".to_string(), name.to_string())],
            cgroup: Vec::new(),
            log_file: None,
            log_level: LogLevel::default(),
            hostname: name.to_string(),
            mac,
            snapshots: Vec::new(),
            backed_by: None,
        }
    }
}

/// In-memory [`Engine`] for tests.
pub struct MockEngine {
    version: String,
    default_config_path: PathBuf,
    containers: Mutex<HashMap<ContainerIdentity, MockContainer>>,
    /// Identities with an engine call currently in flight.
    in_flight: Mutex<HashSet<ContainerIdentity>>,
    /// Last attach spec seen per identity, for assertions on pass-through.
    attach_log: Mutex<HashMap<ContainerIdentity, AttachSpec>>,
    mac_counter: AtomicU64,
    pid_counter: AtomicU64,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Creates a mock engine reporting a modern decorated version string.
    #[must_use]
    pub fn new() -> Self {
        Self::with_version("5.0.0~git2209-g5a7b9ce67-0ubuntu1")
    }

    /// Creates a mock engine reporting the given version string, for
    /// version-gated behavior such as bulk snapshot destruction.
    #[must_use]
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            default_config_path: PathBuf::from("/var/lib/nsbox"),
            containers: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            attach_log: Mutex::new(HashMap::new()),
            mac_counter: AtomicU64::new(1),
            pid_counter: AtomicU64::new(1000),
        }
    }

    /// Last attach spec forwarded for `id`, if any.
    #[must_use]
    pub fn last_attach(&self, id: &ContainerIdentity) -> Option<AttachSpec> {
        self.attach_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Simulates a state change caused by an actor outside this process
    /// (e.g. the container's init exiting). Deliberately bypasses the
    /// reentrancy check: the kernel does not take our locks.
    pub fn simulate_state_change(&self, id: &ContainerIdentity, state: ContainerState) {
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(c) = containers.get_mut(id) {
            c.state = state;
        }
    }

    /// Marks `id` as in flight, panicking on reentry. The returned guard
    /// clears the mark on drop. A short sleep widens the race window so
    /// serialization bugs show up reliably under stress.
    fn enter<'a>(&'a self, id: &ContainerIdentity) -> FlightGuard<'a> {
        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            assert!(
                in_flight.insert(id.clone()),
                "reentrant engine call for container {id}"
            );
        }
        std::thread::sleep(Duration::from_micros(200));
        FlightGuard {
            engine: self,
            id: id.clone(),
        }
    }

    fn next_mac(&self) -> String {
        let n = self.mac_counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "00:16:3e:{:02x}:{:02x}:{:02x}",
            (n >> 16) & 0xff,
            (n >> 8) & 0xff,
            n & 0xff
        )
    }

    fn with_container<T>(
        &self,
        id: &ContainerIdentity,
        f: impl FnOnce(&mut MockContainer) -> Result<T>,
    ) -> Result<T> {
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let container = containers
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        f(container)
    }

    /// Removes a container's entry (definition, storage and snapshots) after
    /// checking the destroy preconditions. On any rejection nothing is
    /// cleaned up.
    fn remove_checked(
        containers: &mut HashMap<ContainerIdentity, MockContainer>,
        id: &ContainerIdentity,
        operation: &'static str,
    ) -> Result<()> {
        let container = containers
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if matches!(
            container.state,
            ContainerState::Running | ContainerState::Frozen
        ) {
            return Err(EngineError::Rejected {
                operation,
                name: id.name().to_string(),
                reason: format!("container is {}", container.state),
            });
        }
        let dependents = containers
            .values()
            .filter(|c| c.backed_by.as_ref() == Some(id))
            .count();
        if dependents > 0 {
            return Err(EngineError::DependentClones {
                name: id.name().to_string(),
                count: dependents,
            });
        }
        containers.remove(id);
        Ok(())
    }

    fn spawn(
        id: &ContainerIdentity,
        argv: &[String],
        spec: &AttachSpec,
        capture: bool,
    ) -> Result<std::process::Child> {
        let (program, args) = argv.split_first().ok_or_else(|| EngineError::Launch {
            name: id.name().to_string(),
            reason: "empty argv".to_string(),
        })?;

        if let Some(cwd) = &spec.cwd {
            if !cwd.is_dir() {
                return Err(EngineError::Launch {
                    name: id.name().to_string(),
                    reason: format!("working directory not found: {}", cwd.display()),
                });
            }
        }

        let mut command = Command::new(program);
        command.args(args).env_clear().stdin(Stdio::null());
        if capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        for entry in &spec.env {
            if let Some((key, value)) = entry.split_once('=') {
                command.env(key, value);
            }
        }
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        if let Some(uid) = spec.uid {
            command.uid(uid);
        }
        if let Some(gid) = spec.gid {
            command.gid(gid);
        }

        command.spawn().map_err(|e| EngineError::Launch {
            name: id.name().to_string(),
            reason: e.to_string(),
        })
    }
}

struct FlightGuard<'a> {
    engine: &'a MockEngine,
    id: ContainerIdentity,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl Engine for MockEngine {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn default_config_path(&self) -> PathBuf {
        self.default_config_path.clone()
    }

    fn define(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if containers.contains_key(id) {
            return Err(EngineError::AlreadyExists(id.to_string()));
        }
        containers.insert(id.clone(), MockContainer::new(id.name(), self.next_mac()));
        Ok(())
    }

    fn defined(&self, id: &ContainerIdentity) -> bool {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    fn destroy(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Self::remove_checked(&mut containers, id, "destroy")
    }

    fn destroy_with_snapshots(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Precondition checks come before any cleanup: a rejected cascade
        // must leave the snapshots untouched.
        Self::remove_checked(&mut containers, id, "destroy_with_snapshots")
    }

    fn state(&self, id: &ContainerIdentity) -> Result<ContainerState> {
        let _flight = self.enter(id);
        self.with_container(id, |c| Ok(c.state))
    }

    fn start(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        let pid = self.pid_counter.fetch_add(1, Ordering::Relaxed);
        self.with_container(id, |c| {
            if c.state != ContainerState::Stopped {
                return Err(EngineError::Rejected {
                    operation: "start",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            c.state = ContainerState::Running;
            c.init_pid = Some(i32::try_from(pid).unwrap_or(i32::MAX));
            Ok(())
        })
    }

    fn stop(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            if !matches!(c.state, ContainerState::Running | ContainerState::Frozen) {
                return Err(EngineError::Rejected {
                    operation: "stop",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            c.state = ContainerState::Stopped;
            c.init_pid = None;
            Ok(())
        })
    }

    fn shutdown(&self, id: &ContainerIdentity, _timeout: Duration) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            if c.state != ContainerState::Running {
                return Err(EngineError::Rejected {
                    operation: "shutdown",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            c.state = ContainerState::Stopped;
            c.init_pid = None;
            Ok(())
        })
    }

    fn reboot(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        let pid = self.pid_counter.fetch_add(1, Ordering::Relaxed);
        self.with_container(id, |c| {
            if c.state != ContainerState::Running {
                return Err(EngineError::Rejected {
                    operation: "reboot",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            c.init_pid = Some(i32::try_from(pid).unwrap_or(i32::MAX));
            Ok(())
        })
    }

    fn freeze(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            if c.state != ContainerState::Running {
                return Err(EngineError::Rejected {
                    operation: "freeze",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            c.state = ContainerState::Frozen;
            Ok(())
        })
    }

    fn unfreeze(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            if c.state != ContainerState::Frozen {
                return Err(EngineError::Rejected {
                    operation: "unfreeze",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            c.state = ContainerState::Running;
            Ok(())
        })
    }

    fn init_pid(&self, id: &ContainerIdentity) -> Option<i32> {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(|c| c.init_pid)
    }

    fn console_fd(&self, id: &ContainerIdentity, _tty: u32) -> Result<RawFd> {
        let _flight = self.enter(id);
        Err(EngineError::Unsupported {
            operation: "console_fd",
            version: self.version.clone(),
        })
    }

    fn may_control(&self, id: &ContainerIdentity) -> bool {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    fn config_item(&self, id: &ContainerIdentity, key: &str) -> Vec<String> {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|c| {
                c.config
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_config_item(&self, id: &ContainerIdentity, key: &str, value: &str) -> Result<()> {
        let _flight = self.enter(id);
        if key.is_empty() {
            return Err(EngineError::Rejected {
                operation: "set_config_item",
                name: id.name().to_string(),
                reason: "empty config key".to_string(),
            });
        }
        self.with_container(id, |c| {
            c.config.push((key.to_string(), value.to_string()));
            if key == "uts.name" {
                c.hostname = value.to_string();
            }
            Ok(())
        })
    }

    fn clear_config_item(&self, id: &ContainerIdentity, key: &str) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            c.config.retain(|(k, _)| k != key);
            Ok(())
        })
    }

    fn config_keys(&self, id: &ContainerIdentity, prefix: &str) -> Vec<String> {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|c| {
                let mut keys: Vec<String> = c
                    .config
                    .iter()
                    .map(|(k, _)| k.clone())
                    .filter(|k| prefix.is_empty() || k.starts_with(prefix))
                    .collect();
                keys.dedup();
                keys
            })
            .unwrap_or_default()
    }

    fn cgroup_item(&self, id: &ContainerIdentity, key: &str) -> Vec<String> {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|c| {
                c.cgroup
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_cgroup_item(&self, id: &ContainerIdentity, key: &str, value: &str) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            c.cgroup.retain(|(k, _)| k != key);
            c.cgroup.push((key.to_string(), value.to_string()));
            Ok(())
        })
    }

    fn log_file(&self, id: &ContainerIdentity) -> Option<PathBuf> {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(|c| c.log_file.clone())
    }

    fn set_log_file(&self, id: &ContainerIdentity, path: &Path) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            c.log_file = Some(path.to_path_buf());
            Ok(())
        })
    }

    fn log_level(&self, id: &ContainerIdentity) -> LogLevel {
        let _flight = self.enter(id);
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|c| c.log_level)
            .unwrap_or_default()
    }

    fn set_log_level(&self, id: &ContainerIdentity, level: LogLevel) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            c.log_level = level;
            Ok(())
        })
    }

    fn defined_names(&self, config_path: &Path) -> Vec<String> {
        let containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = containers
            .keys()
            .filter(|id| id.config_path() == config_path)
            .map(|id| id.name().to_string())
            .collect();
        names.sort();
        names
    }

    fn active_names(&self, config_path: &Path) -> Vec<String> {
        let containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = containers
            .iter()
            .filter(|(id, c)| {
                id.config_path() == config_path
                    && matches!(c.state, ContainerState::Running | ContainerState::Frozen)
            })
            .map(|(id, _)| id.name().to_string())
            .collect();
        names.sort();
        names
    }

    fn attach(&self, id: &ContainerIdentity, argv: &[String], spec: &AttachSpec) -> Result<i32> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            if c.state != ContainerState::Running {
                return Err(EngineError::Rejected {
                    operation: "attach",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            Ok(())
        })?;

        let child = Self::spawn(id, argv, spec, false)?;
        self.attach_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), spec.clone());
        // The caller owns reaping; dropping Child does not reap.
        Ok(i32::try_from(child.id()).unwrap_or(i32::MAX))
    }

    fn execute(&self, id: &ContainerIdentity, argv: &[String]) -> Result<Vec<u8>> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            if c.state != ContainerState::Stopped {
                return Err(EngineError::Rejected {
                    operation: "execute",
                    name: id.name().to_string(),
                    reason: format!("container is {}", c.state),
                });
            }
            Ok(())
        })?;

        let spec = AttachSpec {
            namespaces: crate::Namespaces::all(),
            uid: None,
            gid: None,
            groups: Vec::new(),
            cwd: None,
            arch: crate::Arch::Default,
            env: std::env::vars().map(|(k, v)| format!("{k}={v}")).collect(),
            remount_sys_proc: false,
            elevated_privileges: false,
            stdin_fd: None,
            stdout_fd: None,
            stderr_fd: None,
        };
        let child = Self::spawn(id, argv, &spec, true)?;
        let output = child.wait_with_output().map_err(|e| EngineError::Launch {
            name: id.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(output.stdout)
    }

    fn clone_container(
        &self,
        src: &ContainerIdentity,
        dest: &ContainerIdentity,
        request: &CloneRequest,
    ) -> Result<()> {
        let _flight = self.enter(src);
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let source = containers
            .get(src)
            .ok_or_else(|| EngineError::NotFound(src.to_string()))?
            .clone();
        if containers.contains_key(dest) {
            return Err(EngineError::AlreadyExists(dest.to_string()));
        }

        let mut clone = MockContainer::new(dest.name(), self.next_mac());
        clone.config = source.config.clone();
        if request.keep_name {
            clone.hostname = source.hostname.clone();
        } else {
            clone
                .config
                .retain(|(k, _)| k != "uts.name");
            clone
                .config
                .push(("uts.name".to_string(), dest.name().to_string()));
        }
        if request.keep_mac {
            clone.mac = source.mac;
        }
        if request.snapshot {
            clone.backed_by = Some(src.clone());
        }
        containers.insert(dest.clone(), clone);
        Ok(())
    }

    fn snapshot_create(&self, id: &ContainerIdentity) -> Result<Snapshot> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            // Next unused ordinal, not a plain counter: destroyed snapshots
            // must not cause name reuse of a still-live higher ordinal.
            let next = c
                .snapshots
                .iter()
                .filter_map(|s| s.meta.name.strip_prefix("snap")?.parse::<u64>().ok())
                .max()
                .map_or(0, |n| n + 1);
            let name = format!("snap{next}");
            let meta = Snapshot {
                name: name.clone(),
                comment_path: None,
                timestamp: Utc::now(),
                path: id.config_path().join(id.name()).join("snaps").join(name),
            };
            c.snapshots.push(StoredSnapshot {
                meta: meta.clone(),
                state: c.state,
                config: c.config.clone(),
                hostname: c.hostname.clone(),
                mac: c.mac.clone(),
            });
            Ok(meta)
        })
    }

    fn snapshot_list(&self, id: &ContainerIdentity) -> Result<Vec<Snapshot>> {
        let _flight = self.enter(id);
        self.with_container(id, |c| Ok(c.snapshots.iter().map(|s| s.meta.clone()).collect()))
    }

    fn snapshot_restore(
        &self,
        id: &ContainerIdentity,
        name: &str,
        dest: &ContainerIdentity,
    ) -> Result<()> {
        let _flight = self.enter(id);
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stored = containers
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?
            .snapshots
            .iter()
            .find(|s| s.meta.name == name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("{id} snapshot {name}")))?;

        // Restoring over the source itself is explicit consent to overwrite;
        // any other existing destination is an error.
        if dest != id && containers.contains_key(dest) {
            return Err(EngineError::AlreadyExists(dest.to_string()));
        }

        let mut restored = MockContainer::new(dest.name(), self.next_mac());
        restored.state = stored.state;
        restored.config = stored.config;
        restored.hostname = stored.hostname;
        restored.mac = stored.mac;
        containers.insert(dest.clone(), restored);
        Ok(())
    }

    fn snapshot_destroy(&self, id: &ContainerIdentity, name: &str) -> Result<()> {
        let _flight = self.enter(id);
        self.with_container(id, |c| {
            let before = c.snapshots.len();
            c.snapshots.retain(|s| s.meta.name != name);
            if c.snapshots.len() == before {
                return Err(EngineError::NotFound(format!("{id} snapshot {name}")));
            }
            Ok(())
        })
    }

    fn snapshot_destroy_all(&self, id: &ContainerIdentity) -> Result<()> {
        let _flight = self.enter(id);
        if !version_at_least(&self.version, 1, 1, 0) {
            return Err(EngineError::Unsupported {
                operation: "snapshot_destroy_all",
                version: self.version.clone(),
            });
        }
        self.with_container(id, |c| {
            c.snapshots.clear();
            Ok(())
        })
    }
}
