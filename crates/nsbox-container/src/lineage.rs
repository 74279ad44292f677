//! Clone, snapshot and restore lineage between containers.

use crate::error::{ContainerError, Result};
use crate::handle::Container;
use crate::locking;
use nsbox_engine::{BackendStore, CloneRequest, ContainerIdentity, Snapshot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Options for cloning a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneOptions {
    /// Backing store for the new container.
    pub backend: BackendStore,
    /// Config-store path for the clone; `None` uses the source's.
    pub config_path: Option<PathBuf>,
    /// Keep the source's name-derived hostname verbatim.
    pub keep_name: bool,
    /// Keep the source's MAC address verbatim.
    pub keep_mac: bool,
    /// Make the clone snapshot-backed (copy-on-write against the source)
    /// instead of a full independent copy. While such clones exist the
    /// source cannot be destroyed.
    pub snapshot: bool,
}

impl Default for CloneOptions {
    /// A full directory copy under the source's config-store path.
    fn default() -> Self {
        Self {
            backend: BackendStore::Dir,
            config_path: None,
            keep_name: false,
            keep_mac: false,
            snapshot: false,
        }
    }
}

/// Locks `src`, and `dest` when distinct, in a globally consistent order
/// so opposing clone/restore pairs cannot deadlock.
fn lock_pair(
    src: &ContainerIdentity,
    dest: &ContainerIdentity,
) -> (locking::IdentityGuard, Option<locking::IdentityGuard>) {
    if src == dest {
        (locking::lock(src), None)
    } else if src < dest {
        let first = locking::lock(src);
        (first, Some(locking::lock(dest)))
    } else {
        let second = locking::lock(dest);
        (locking::lock(src), Some(second))
    }
}

impl Container {
    /// Clones this container into `dest_name`.
    ///
    /// The destination lives under `options.config_path` when given, else
    /// under this container's config-store path. A fresh lock registry
    /// entry is held for the destination for the duration of the engine
    /// call, so concurrent operations against the nascent identity
    /// serialize properly.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] (source),
    /// [`ContainerError::AlreadyExists`] (destination), or an engine
    /// rejection.
    pub fn clone_to(&self, dest_name: &str, options: &CloneOptions) -> Result<()> {
        let dest = self.sibling_identity(dest_name, options.config_path.clone())?;
        if dest == *self.identity() {
            return Err(ContainerError::AlreadyExists(dest.to_string()));
        }
        let request = CloneRequest {
            backend: options.backend,
            keep_name: options.keep_name,
            keep_mac: options.keep_mac,
            snapshot: options.snapshot,
        };

        locking::retain(&dest);
        let result = {
            let _guards = lock_pair(self.identity(), &dest);
            self.engine()
                .clone_container(self.identity(), &dest, &request)
                .map_err(|e| {
                    ContainerError::from_engine("clone", &self.identity().to_string(), e)
                })
        };
        locking::release(&dest);

        if result.is_ok() {
            info!(
                source = %self.identity(),
                dest = %dest,
                backend = %options.backend,
                snapshot = options.snapshot,
                "container cloned"
            );
        }
        result
    }

    /// Creates a snapshot under the next unused ordinal name.
    ///
    /// Snapshots are independent of the container's running state.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] or an engine rejection.
    pub fn create_snapshot(&self) -> Result<Snapshot> {
        let snapshot = self.engine_call("snapshot_create", |e| e.snapshot_create(self.identity()))?;
        debug!(container = %self.identity(), snapshot = %snapshot.name, "snapshot created");
        Ok(snapshot)
    }

    /// Lists this container's snapshots.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`].
    pub fn snapshots(&self) -> Result<Vec<Snapshot>> {
        self.engine_call("snapshot_list", |e| e.snapshot_list(self.identity()))
    }

    /// Materializes `dest_name` from a named snapshot of this container.
    ///
    /// Restoring over this container's own name is explicit consent to
    /// overwrite it; any other existing destination is rejected.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] (container or snapshot),
    /// [`ContainerError::AlreadyExists`] (destination), or an engine
    /// rejection.
    pub fn restore_snapshot(&self, snapshot: &Snapshot, dest_name: &str) -> Result<()> {
        let dest = self.sibling_identity(dest_name, None)?;

        locking::retain(&dest);
        let result = {
            let _guards = lock_pair(self.identity(), &dest);
            self.engine()
                .snapshot_restore(self.identity(), &snapshot.name, &dest)
                .map_err(|e| {
                    ContainerError::from_engine("snapshot_restore", &self.identity().to_string(), e)
                })
        };
        locking::release(&dest);

        if result.is_ok() {
            info!(
                source = %self.identity(),
                snapshot = %snapshot.name,
                dest = %dest,
                "snapshot restored"
            );
        }
        result
    }

    /// Destroys one named snapshot.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] (container or snapshot).
    pub fn destroy_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.engine_call("snapshot_destroy", |e| {
            e.snapshot_destroy(self.identity(), &snapshot.name)
        })
    }

    /// Destroys all of this container's snapshots in one engine call.
    ///
    /// # Errors
    ///
    /// [`ContainerError::Unsupported`] on engine versions lacking bulk
    /// destruction — a first-class outcome, never a silent no-op — or
    /// [`ContainerError::NotFound`].
    pub fn destroy_all_snapshots(&self) -> Result<()> {
        self.engine_call("snapshot_destroy_all", |e| {
            e.snapshot_destroy_all(self.identity())
        })
    }

    /// Removes the container's definition and backing storage.
    ///
    /// Destroying a container does not implicitly destroy its snapshots;
    /// use [`destroy_with_all_snapshots`](Container::destroy_with_all_snapshots)
    /// for that. While snapshot-backed clones depend on this container the
    /// call fails with [`ContainerError::DependentClones`] and cleans up
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`], [`ContainerError::DependentClones`],
    /// or an engine rejection (e.g. still running).
    pub fn destroy(&self) -> Result<()> {
        let result = self.engine_call("destroy", |e| e.destroy(self.identity()));
        if result.is_ok() {
            info!(container = %self.identity(), "container destroyed");
        }
        result
    }

    /// Removes the container, its backing storage and its own snapshots
    /// (explicit cascading consent).
    ///
    /// # Errors
    ///
    /// Same as [`destroy`](Container::destroy).
    pub fn destroy_with_all_snapshots(&self) -> Result<()> {
        let result = self.engine_call("destroy_with_snapshots", |e| {
            e.destroy_with_snapshots(self.identity())
        });
        if result.is_ok() {
            info!(container = %self.identity(), "container and snapshots destroyed");
        }
        result
    }

    /// Builds an identity next to this one, under an optional explicit
    /// config-store path.
    fn sibling_identity(
        &self,
        name: &str,
        config_path: Option<PathBuf>,
    ) -> Result<ContainerIdentity> {
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(ContainerError::InvalidName(name.to_string()));
        }
        let config_path =
            config_path.unwrap_or_else(|| self.identity().config_path().to_path_buf());
        Ok(ContainerIdentity::new(name, config_path))
    }
}
