//! Running processes inside a container's namespace subset.

use crate::error::{ContainerError, Result};
use crate::handle::Container;
use nsbox_engine::{Arch, AttachSpec, Namespaces};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use tracing::debug;

/// Options for attaching a process to a container.
///
/// This is a plain configuration record; every field's default means
/// "inherit the engine's default behavior". Build one with struct-update
/// syntax:
///
/// ```
/// use nsbox_container::AttachOptions;
///
/// let options = AttachOptions {
///     clear_env: true,
///     env: vec!["FOO=BAR".to_string()],
///     ..AttachOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachOptions {
    /// Namespaces the process joins. Defaults to all of the container's
    /// namespaces; omitting one keeps the process in the host's
    /// corresponding namespace (deliberate escape hatch, forwarded to the
    /// engine exactly as given).
    pub namespaces: Namespaces,
    /// Numeric uid to switch to inside the container; `None` inherits.
    pub uid: Option<u32>,
    /// Numeric gid to switch to inside the container; `None` inherits.
    pub gid: Option<u32>,
    /// Supplementary groups; empty inherits.
    pub groups: Vec<u32>,
    /// Working directory inside the container; `None` inherits.
    pub cwd: Option<PathBuf>,
    /// Architecture personality override; `Default` inherits.
    pub arch: Arch,
    /// Environment entries (`KEY=VALUE`) to set. On key collision these
    /// always win over preserved caller entries.
    pub env: Vec<String>,
    /// Names of caller environment variables to preserve when
    /// [`clear_env`](Self::clear_env) is set; ignored otherwise.
    pub env_to_keep: Vec<String>,
    /// Start from an empty environment instead of the caller's.
    pub clear_env: bool,
    /// Remount /sys and /proc when not joining the mount namespace.
    pub remount_sys_proc: bool,
    /// Run with elevated privileges instead of the container's settings.
    pub elevated_privileges: bool,
    /// Stdin descriptor override; `None` inherits.
    pub stdin_fd: Option<RawFd>,
    /// Stdout descriptor override; `None` inherits.
    pub stdout_fd: Option<RawFd>,
    /// Stderr descriptor override; `None` inherits.
    pub stderr_fd: Option<RawFd>,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            namespaces: Namespaces::all(),
            uid: None,
            gid: None,
            groups: Vec::new(),
            cwd: None,
            arch: Arch::Default,
            env: Vec::new(),
            env_to_keep: Vec::new(),
            clear_env: false,
            remount_sys_proc: false,
            elevated_privileges: false,
            stdin_fd: None,
            stdout_fd: None,
            stderr_fd: None,
        }
    }
}

impl AttachOptions {
    /// Composes the final environment for the attached process from these
    /// options and the caller's environment.
    ///
    /// With [`clear_env`](Self::clear_env) the base is empty except for the
    /// caller variables named in [`env_to_keep`](Self::env_to_keep);
    /// without it, the base is the caller's full environment. Explicit
    /// [`env`](Self::env) entries are applied last and win on collision.
    #[must_use]
    pub fn resolved_env(&self, caller_env: &[(String, String)]) -> Vec<String> {
        let mut merged: BTreeMap<String, String> = if self.clear_env {
            caller_env
                .iter()
                .filter(|(key, _)| self.env_to_keep.iter().any(|keep| keep == key))
                .cloned()
                .collect()
        } else {
            caller_env.iter().cloned().collect()
        };

        for entry in &self.env {
            match entry.split_once('=') {
                Some((key, value)) => merged.insert(key.to_string(), value.to_string()),
                None => merged.insert(entry.clone(), String::new()),
            };
        }

        merged
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }

    fn to_spec(&self, caller_env: &[(String, String)]) -> AttachSpec {
        AttachSpec {
            namespaces: self.namespaces,
            uid: self.uid,
            gid: self.gid,
            groups: self.groups.clone(),
            cwd: self.cwd.clone(),
            arch: self.arch,
            env: self.resolved_env(caller_env),
            remount_sys_proc: self.remount_sys_proc,
            elevated_privileges: self.elevated_privileges,
            stdin_fd: self.stdin_fd,
            stdout_fd: self.stdout_fd,
            stderr_fd: self.stderr_fd,
        }
    }
}

impl Container {
    /// Launches `argv` inside the container and blocks until it exits,
    /// returning whether it exited with status zero.
    ///
    /// Non-zero exit and signal termination are `Ok(false)`, not errors.
    /// The identity lock is held only while the engine spawns the process;
    /// reaping happens outside it, so a long-running command does not
    /// starve other operations on the same identity.
    ///
    /// # Errors
    ///
    /// [`ContainerError::Launch`] when the process could not be started at
    /// all (empty argv, missing working directory, unresolvable uid/gid,
    /// namespace join failure), [`ContainerError::NotFound`], or an engine
    /// rejection when the container is not in a runnable state.
    pub fn run_command(&self, argv: &[String], options: &AttachOptions) -> Result<bool> {
        let pid = self.run_command_no_wait(argv, options)?;
        match waitpid(Pid::from_raw(pid), None) {
            Ok(WaitStatus::Exited(_, 0)) => Ok(true),
            Ok(_) => Ok(false),
            Err(errno) => Err(ContainerError::Io(std::io::Error::from_raw_os_error(
                errno as i32,
            ))),
        }
    }

    /// Launches `argv` inside the container and returns the host-visible
    /// pid immediately.
    ///
    /// The caller is responsible for waiting on and reaping that process
    /// through ordinary host process management, not through this handle.
    ///
    /// # Errors
    ///
    /// Same as [`run_command`](Container::run_command).
    pub fn run_command_no_wait(&self, argv: &[String], options: &AttachOptions) -> Result<i32> {
        if argv.is_empty() {
            return Err(ContainerError::Launch {
                name: self.name().to_string(),
                reason: "empty argv".to_string(),
            });
        }
        let caller_env: Vec<(String, String)> = std::env::vars().collect();
        let spec = options.to_spec(&caller_env);
        debug!(container = %self.identity(), command = %argv[0], "attaching");
        self.engine_call("attach", |e| e.attach(self.identity(), argv, &spec))
    }

    /// Runs `argv` inside an otherwise-stopped container and returns its
    /// captured stdout.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`], [`ContainerError::Launch`], or an
    /// engine rejection.
    pub fn execute(&self, argv: &[String]) -> Result<Vec<u8>> {
        if argv.is_empty() {
            return Err(ContainerError::Launch {
                name: self.name().to_string(),
                reason: "empty argv".to_string(),
            });
        }
        self.engine_call("execute", |e| e.execute(self.identity(), argv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> Vec<(String, String)> {
        vec![
            ("HOME".to_string(), "/root".to_string()),
            ("USER".to_string(), "root".to_string()),
            ("TERM".to_string(), "xterm".to_string()),
        ]
    }

    #[test]
    fn default_options_inherit_everything() {
        let options = AttachOptions::default();
        assert_eq!(options.namespaces, Namespaces::all());
        assert!(options.uid.is_none());
        assert!(!options.clear_env);
        let env = options.resolved_env(&caller());
        assert!(env.contains(&"HOME=/root".to_string()));
        assert!(env.contains(&"TERM=xterm".to_string()));
    }

    #[test]
    fn clear_env_drops_the_caller_environment() {
        let options = AttachOptions {
            clear_env: true,
            env: vec!["FOO=BAR".to_string()],
            ..AttachOptions::default()
        };
        assert_eq!(options.resolved_env(&caller()), vec!["FOO=BAR".to_string()]);
    }

    #[test]
    fn env_to_keep_copies_only_the_named_variables() {
        let options = AttachOptions {
            clear_env: true,
            env_to_keep: vec!["USER".to_string()],
            ..AttachOptions::default()
        };
        assert_eq!(options.resolved_env(&caller()), vec!["USER=root".to_string()]);
    }

    #[test]
    fn explicit_env_wins_over_preserved_entries() {
        let options = AttachOptions {
            clear_env: true,
            env_to_keep: vec!["USER".to_string()],
            env: vec!["USER=nobody".to_string()],
            ..AttachOptions::default()
        };
        assert_eq!(
            options.resolved_env(&caller()),
            vec!["USER=nobody".to_string()]
        );
    }

    #[test]
    fn env_to_keep_is_ignored_without_clear_env() {
        let options = AttachOptions {
            env_to_keep: vec!["USER".to_string()],
            ..AttachOptions::default()
        };
        assert_eq!(options.resolved_env(&caller()).len(), caller().len());
    }
}
