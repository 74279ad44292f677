//! Snapshot metadata and clone requests.

use crate::state::BackendStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named, point-in-time saved state of a container's storage.
///
/// Snapshots belong to exactly one source container and are independent of
/// its running state. Unnamed creation allocates the next unused ordinal
/// name (`snap0`, `snap1`, ...); names are unique within the source's
/// snapshot set at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot name, unique within the source container.
    pub name: String,
    /// Path to the snapshot's comment file, if one was written.
    pub comment_path: Option<PathBuf>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// On-disk location of the snapshot.
    pub path: PathBuf,
}

impl Snapshot {
    /// Refers to an existing snapshot by name, e.g. for restore or destroy.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment_path: None,
            timestamp: DateTime::<Utc>::MIN_UTC,
            path: PathBuf::new(),
        }
    }
}

/// A resolved clone request crossing the engine boundary.
///
/// The destination identity (including its config-store path) has already
/// been decided by the control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRequest {
    /// Backing store for the new container.
    pub backend: BackendStore,
    /// Keep the source's name-derived hostname verbatim.
    pub keep_name: bool,
    /// Keep the source's MAC address verbatim.
    pub keep_mac: bool,
    /// Snapshot-backed (copy-on-write against the source) instead of a full
    /// independent copy.
    pub snapshot: bool,
}
