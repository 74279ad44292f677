//! Container execution states and clone backing stores.

use serde::{Deserialize, Serialize};

/// Execution state of a container, as reported by the engine.
///
/// The zero value is `Invalid`: a freshly declared but never-queried state
/// must not read as a real state (in particular, never as `Stopped`). State
/// is always re-derived from the engine on query and never cached, since it
/// can change behind the process's back (e.g. the container's init process
/// exiting).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerState {
    /// Unqueried placeholder; not a real state.
    #[default]
    Invalid,
    /// Container is not running.
    Stopped,
    /// Container is in the process of starting.
    Starting,
    /// Container is running.
    Running,
    /// Container is in the process of stopping.
    Stopping,
    /// Container start or stop is being aborted.
    Aborting,
    /// Container is in the process of freezing.
    Freezing,
    /// Container is frozen.
    Frozen,
    /// Container has been thawed and is resuming.
    Thawed,
}

impl ContainerState {
    /// Parses an engine state string. Unknown strings map to `Invalid`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "STOPPED" => Self::Stopped,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "ABORTING" => Self::Aborting,
            "FREEZING" => Self::Freezing,
            "FROZEN" => Self::Frozen,
            "THAWED" => Self::Thawed,
            _ => Self::Invalid,
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Invalid => "",
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Aborting => "ABORTING",
            Self::Freezing => "FREEZING",
            Self::Frozen => "FROZEN",
            Self::Thawed => "THAWED",
        };
        write!(f, "{s}")
    }
}

/// Backing store used when cloning a container.
///
/// As with [`ContainerState`], the zero value is `Invalid` so an
/// uninitialized field can never be mistaken for a real store kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStore {
    /// Unqueried placeholder; not a real store kind.
    #[default]
    Invalid,
    /// Plain directory copy.
    Dir,
    /// Overlay filesystem (copy-on-write against the source).
    Overlay,
    /// Btrfs subvolume snapshot.
    Btrfs,
    /// ZFS dataset clone.
    Zfs,
    /// LVM snapshot volume.
    Lvm,
    /// Loopback file.
    Loop,
    /// Let the engine pick the best available store.
    Best,
}

impl std::fmt::Display for BackendStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Invalid => "",
            Self::Dir => "dir",
            Self::Overlay => "overlayfs",
            Self::Btrfs => "btrfs",
            Self::Zfs => "zfs",
            Self::Lvm => "lvm",
            Self::Loop => "loop",
            Self::Best => "best",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_state_is_invalid_and_renders_empty() {
        let state = ContainerState::default();
        assert_eq!(state, ContainerState::Invalid);
        assert_ne!(state, ContainerState::Stopped);
        assert_eq!(state.to_string(), "");
    }

    #[test]
    fn zero_backend_store_is_invalid_and_renders_empty() {
        let store = BackendStore::default();
        assert_eq!(store, BackendStore::Invalid);
        assert_ne!(store, BackendStore::Dir);
        assert_eq!(store.to_string(), "");
    }

    #[test]
    fn parse_round_trips_real_states() {
        for state in [
            ContainerState::Stopped,
            ContainerState::Starting,
            ContainerState::Running,
            ContainerState::Stopping,
            ContainerState::Aborting,
            ContainerState::Freezing,
            ContainerState::Frozen,
            ContainerState::Thawed,
        ] {
            assert_eq!(ContainerState::parse(&state.to_string()), state);
        }
        assert_eq!(ContainerState::parse("bogus"), ContainerState::Invalid);
    }
}
