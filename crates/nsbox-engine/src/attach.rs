//! Resolved attach requests passed across the engine boundary.
//!
//! The control layer composes the final environment and defaults before the
//! engine sees the request; everything in [`AttachSpec`] is therefore fully
//! resolved ("inherit" has already been decided by the caller).

use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;
use std::path::PathBuf;

/// The subset of the container's namespaces a launched process joins.
///
/// Every namespace is independently selectable. Omitting one means the
/// process stays in the host's corresponding namespace; this is a deliberate
/// escape hatch (e.g. omitting `network` lets a diagnostic process reach the
/// host network) and is forwarded to the engine exactly as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespaces {
    /// PID namespace.
    pub pid: bool,
    /// Mount namespace.
    pub mount: bool,
    /// Network namespace.
    pub network: bool,
    /// IPC namespace.
    pub ipc: bool,
    /// UTS (hostname) namespace.
    pub uts: bool,
    /// Cgroup namespace.
    pub cgroup: bool,
    /// User namespace.
    pub user: bool,
}

impl Namespaces {
    /// All of the container's namespaces.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            pid: true,
            mount: true,
            network: true,
            ipc: true,
            uts: true,
            cgroup: true,
            user: true,
        }
    }

    /// No namespaces; the process stays entirely on the host side.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            pid: false,
            mount: false,
            network: false,
            ipc: false,
            uts: false,
            cgroup: false,
            user: false,
        }
    }
}

impl Default for Namespaces {
    /// Joining all namespaces is the engine's default attach behavior.
    fn default() -> Self {
        Self::all()
    }
}

/// Architecture personality for the launched process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arch {
    /// Inherit the engine default personality.
    #[default]
    Default,
    /// 32-bit x86 personality.
    X86,
    /// 64-bit x86 personality.
    X86_64,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "",
            Self::X86 => "i686",
            Self::X86_64 => "x86_64",
        };
        write!(f, "{s}")
    }
}

/// A fully resolved attach request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachSpec {
    /// Namespaces to join.
    pub namespaces: Namespaces,
    /// Numeric uid to switch to inside the container, if any.
    pub uid: Option<u32>,
    /// Numeric gid to switch to inside the container, if any.
    pub gid: Option<u32>,
    /// Supplementary groups, if any.
    pub groups: Vec<u32>,
    /// Working directory inside the container, if any.
    pub cwd: Option<PathBuf>,
    /// Architecture personality override.
    pub arch: Arch,
    /// Complete environment (`KEY=VALUE`), applied to a cleared environment.
    pub env: Vec<String>,
    /// Remount /sys and /proc for a process not in the mount namespace.
    pub remount_sys_proc: bool,
    /// Run with elevated privileges instead of the container's settings.
    pub elevated_privileges: bool,
    /// Stdin descriptor override; inherit when absent.
    pub stdin_fd: Option<RawFd>,
    /// Stdout descriptor override; inherit when absent.
    pub stdout_fd: Option<RawFd>,
    /// Stderr descriptor override; inherit when absent.
    pub stderr_fd: Option<RawFd>,
}
