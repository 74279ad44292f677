//! Container identity.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Immutable identity of a container: its name plus the config-store path
/// it is defined under.
///
/// Two handles with equal identity contend on the same lock registry entry;
/// handles with different identities never contend. The same name under two
/// different config-store paths names two unrelated containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerIdentity {
    name: String,
    config_path: PathBuf,
}

impl ContainerIdentity {
    /// Creates an identity from a name and config-store path.
    #[must_use]
    pub fn new(name: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            config_path: config_path.into(),
        }
    }

    /// Returns the container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the config-store path the container is defined under.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl std::fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.config_path.display(), self.name)
    }
}
