//! Extensions-root directory resolution
//!
//! Managed (store-installed) extensions live under a single application-owned
//! folder, keyed by extension id. Local extensions live wherever the user
//! pointed at import time and are never relocated.

use std::path::{Path, PathBuf};

use altdot_core::{Error, Result};

/// Environment override for the extensions root
pub const EXT_HOME_ENV: &str = "ALTDOT_EXT_HOME";

/// The application-owned folder holding managed extension bundles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRoot {
    root: PathBuf,
}

impl ExtensionRoot {
    /// Create a root at an explicit path
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from `ALTDOT_EXT_HOME`, falling back to `~/.altdot/extensions`
    pub fn from_env() -> Result<Self> {
        if let Some(path) = std::env::var_os(EXT_HOME_ENV) {
            return Ok(Self::new(PathBuf::from(path)));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::validation("could not determine home directory"))?;
        Ok(Self::new(home.join(".altdot").join("extensions")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Live directory of a managed extension
    pub fn managed_dir(&self, extension_id: &str) -> PathBuf {
        self.root.join(extension_id)
    }

    /// Temporary extraction location for a store update, promoted to the
    /// managed directory only after the DB transaction commits
    pub fn staging_dir(&self, extension_id: &str) -> PathBuf {
        self.root.join(".staging").join(extension_id)
    }

    /// Create the root and staging directories if missing
    pub fn ensure_base_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.root.join(".staging"))?;
        Ok(())
    }
}
