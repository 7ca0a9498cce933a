//! Update payload application
//!
//! An [`UpdaterApplier`] applies one payload inside the caller's transaction,
//! in a fixed order: commands, credentials, configs, the extension row, and
//! only then any on-disk file replacement. File replacement is sequenced last
//! so a DB failure rolls the transaction back while the old files remain the
//! single source of truth.

use std::collections::HashSet;
use std::path::PathBuf;

use altdot_core::{ExtensionManifest, Result};
use rusqlite::Connection;
use tracing::debug;

use crate::config::ExtensionRoot;
use crate::db::{self, ExtensionCommandRow};
use crate::unpack;

/// Partial field patch describing a failure, applied to the extension row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPatch {
    pub error_message: Option<String>,
}

/// What the updater decided for a single extension
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    /// Manifest extraction failed; mark the row errored without losing it
    Error {
        extension_id: String,
        patch: ExtensionPatch,
    },
    /// A validated manifest to reconcile; `staging_dir` holds freshly
    /// extracted files, `None` when the source is already in place
    Manifest {
        extension_id: String,
        manifest: ExtensionManifest,
        staging_dir: Option<PathBuf>,
    },
}

impl UpdatePayload {
    pub fn extension_id(&self) -> &str {
        match self {
            Self::Error { extension_id, .. } | Self::Manifest { extension_id, .. } => extension_id,
        }
    }
}

/// Applies one update payload against an open transaction
pub struct UpdaterApplier<'a> {
    conn: &'a Connection,
    root: &'a ExtensionRoot,
}

impl<'a> UpdaterApplier<'a> {
    pub fn new(conn: &'a Connection, root: &'a ExtensionRoot) -> Self {
        Self { conn, root }
    }

    pub fn apply(&self, payload: &UpdatePayload) -> Result<()> {
        match payload {
            UpdatePayload::Error {
                extension_id,
                patch,
            } => {
                debug!(extension_id, "applying error payload");
                db::patch_extension_error(self.conn, extension_id, patch.error_message.as_deref())
            }
            UpdatePayload::Manifest {
                extension_id,
                manifest,
                staging_dir,
            } => {
                debug!(extension_id, version = %manifest.version, "applying manifest payload");
                self.update_commands(extension_id, manifest)?;
                self.update_credentials(extension_id, manifest)?;
                self.update_config(extension_id, manifest)?;
                self.update_extension(extension_id, manifest)?;
                if let Some(staging) = staging_dir {
                    self.replace_extension_files(extension_id, staging)?;
                }
                Ok(())
            }
        }
    }

    /// Upsert every manifest command and prune rows the manifest no longer
    /// declares. User toggles survive via the upsert's conflict clause.
    fn update_commands(&self, extension_id: &str, manifest: &ExtensionManifest) -> Result<()> {
        let mut keep = HashSet::with_capacity(manifest.commands.len());
        for command in &manifest.commands {
            let row = ExtensionCommandRow::from_manifest(extension_id, command)?;
            keep.insert(row.id.clone());
            db::upsert_command(self.conn, &row)?;
        }
        db::prune_commands(self.conn, extension_id, &keep)
    }

    /// Credential reconciliation is deliberately a no-op: existing rows are
    /// preserved unconditionally. Pruning on a manifest diff could silently
    /// log users out of connected accounts.
    fn update_credentials(&self, _extension_id: &str, _manifest: &ExtensionManifest) -> Result<()> {
        Ok(())
    }

    /// Prune config rows the manifest can no longer describe; values of
    /// surviving configs are never rewritten
    fn update_config(&self, extension_id: &str, manifest: &ExtensionManifest) -> Result<()> {
        let keep: HashSet<String> = manifest.config_ids(extension_id).into_iter().collect();
        db::prune_configs(self.conn, extension_id, &keep)
    }

    fn update_extension(&self, extension_id: &str, manifest: &ExtensionManifest) -> Result<()> {
        db::patch_extension_manifest_fields(self.conn, extension_id, manifest, chrono::Utc::now())
    }

    /// Promote the staging directory into the live managed directory
    fn replace_extension_files(&self, extension_id: &str, staging: &std::path::Path) -> Result<()> {
        let live = self.root.managed_dir(extension_id);
        debug!(extension_id, live = %live.display(), "replacing extension files");
        unpack::replace_dir_contents(&live, staging)
    }
}
