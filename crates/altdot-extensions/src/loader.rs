//! Install, import, reload and uninstall orchestration
//!
//! The loader is the write-side entry point for extension lifecycle
//! operations. It composes the manifest extractor, the unpacker and the
//! database under transactions, owns the in-memory "currently installing"
//! guard, and emits change notifications after every committed mutation.
//!
//! Host-side collaborators (global shortcut bindings, per-extension private
//! databases) sit behind [`HostHooks`]; hook failures are logged and never
//! fail the lifecycle operation that triggered them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use altdot_core::{extract_manifest_from_path, Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::ExtensionRoot;
use crate::db::{
    self, Database, ExtensionCommandRow, ExtensionConfigRow, ExtensionRow, ExtensionWithCommands,
};
use crate::events::{ChangeBus, Selector, StaleQuery};
use crate::paths::PathResolver;
use crate::registry::RegistryClient;
use crate::unpack;
use crate::updater::ExtensionUpdater;

/// Host application callbacks invoked during uninstall
///
/// Both calls are best-effort: a failure is logged and the uninstall
/// proceeds.
#[async_trait]
pub trait HostHooks: Send + Sync {
    /// Remove any global shortcut bindings keyed by the given command ids
    async fn unregister_shortcuts(&self, extension_id: &str, command_ids: &[String]) -> Result<()> {
        let _ = (extension_id, command_ids);
        Ok(())
    }

    /// Drop the extension's private per-extension storage
    async fn delete_private_data(&self, extension_id: &str) -> Result<()> {
        let _ = extension_id;
        Ok(())
    }
}

/// [`HostHooks`] implementation that does nothing; for headless use and tests
pub struct NoopHostHooks;

#[async_trait]
impl HostHooks for NoopHostHooks {}

/// Options for [`ExtensionLoader::import_extension`]
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Explicit id; derived from the bundle path when absent
    pub extension_id: Option<String>,
    /// Whether the bundle directory is user-owned (not managed by us)
    pub is_local: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::local()
    }
}

impl ImportOptions {
    /// Import of a user-owned local directory
    pub fn local() -> Self {
        Self {
            extension_id: None,
            is_local: true,
        }
    }

    /// Import of a store bundle already unpacked into the managed directory
    pub fn managed(extension_id: impl Into<String>) -> Self {
        Self {
            extension_id: Some(extension_id.into()),
            is_local: false,
        }
    }
}

/// Deterministic id for a local extension: truncated digest of its
/// normalized bundle directory
pub fn derive_extension_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

fn normalize_dir(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Removes its id from the installing set when dropped, so the guard is
/// released on every exit path including errors
struct InstallGuard<'a> {
    installing: &'a Mutex<HashSet<String>>,
    extension_id: String,
}

impl<'a> InstallGuard<'a> {
    /// Returns `None` when an install for this id is already in flight
    fn acquire(installing: &'a Mutex<HashSet<String>>, extension_id: &str) -> Option<Self> {
        let mut set = installing.lock().expect("install guard mutex poisoned");
        if !set.insert(extension_id.to_string()) {
            return None;
        }
        Some(Self {
            installing,
            extension_id: extension_id.to_string(),
        })
    }
}

impl Drop for InstallGuard<'_> {
    fn drop(&mut self) {
        let mut set = self
            .installing
            .lock()
            .expect("install guard mutex poisoned");
        set.remove(&self.extension_id);
    }
}

/// Extension lifecycle orchestrator
pub struct ExtensionLoader {
    db: Arc<Database>,
    root: ExtensionRoot,
    registry: Arc<dyn RegistryClient>,
    hooks: Arc<dyn HostHooks>,
    bus: ChangeBus,
    paths: PathResolver,
    updater: ExtensionUpdater,
    installing: Mutex<HashSet<String>>,
}

impl ExtensionLoader {
    pub fn new(
        db: Arc<Database>,
        root: ExtensionRoot,
        registry: Arc<dyn RegistryClient>,
        hooks: Arc<dyn HostHooks>,
        bus: ChangeBus,
    ) -> Self {
        let paths = PathResolver::new(Arc::clone(&db), root.clone());
        let updater = ExtensionUpdater::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            root.clone(),
            bus.clone(),
        );
        Self {
            db,
            root,
            registry,
            hooks,
            bus,
            paths,
            updater,
            installing: Mutex::new(HashSet::new()),
        }
    }

    /// On-disk path resolver sharing this loader's database handle
    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// The updater driving scheduled and manual update passes
    pub fn updater(&self) -> &ExtensionUpdater {
        &self.updater
    }

    pub fn list_extensions(&self) -> Result<Vec<ExtensionRow>> {
        self.db.with_conn(db::list_extensions)
    }

    pub fn get_extension(&self, extension_id: &str) -> Result<Option<ExtensionWithCommands>> {
        self.db
            .with_conn(|conn| db::get_extension_with_commands(conn, extension_id))
    }

    /// Register the extension whose `manifest.json` lives at `manifest_path`
    ///
    /// Idempotent: if a row already matches the requested id or the bundle
    /// directory, returns `Ok(None)` without touching anything, so a
    /// double-invocation (duplicate file-drop events) is harmless. A manifest
    /// that fails extraction surfaces as a validation error with the
    /// extractor's message.
    pub fn import_extension(
        &self,
        manifest_path: &Path,
        options: ImportOptions,
    ) -> Result<Option<ExtensionWithCommands>> {
        let bundle_dir = normalize_dir(
            manifest_path
                .parent()
                .ok_or_else(|| Error::validation("manifest path has no containing directory"))?,
        );
        let bundle_dir_str = bundle_dir.to_string_lossy().into_owned();

        let duplicate = self.db.with_conn(|conn| {
            if let Some(id) = &options.extension_id {
                if db::get_extension(conn, id)?.is_some() {
                    return Ok(true);
                }
            }
            Ok(db::find_extension_by_path(conn, &bundle_dir_str)?.is_some())
        })?;
        if duplicate {
            debug!(path = %bundle_dir.display(), "extension already imported");
            return Ok(None);
        }

        let manifest = extract_manifest_from_path(manifest_path)?;

        let extension_id = options
            .extension_id
            .unwrap_or_else(|| derive_extension_id(&bundle_dir));

        let extension = ExtensionRow {
            id: extension_id.clone(),
            name: manifest.name.clone(),
            title: manifest.title.clone(),
            description: manifest.description.clone(),
            version: manifest.version.clone(),
            icon: manifest.icon.clone(),
            author: manifest.author.clone(),
            path: if options.is_local {
                bundle_dir_str
            } else {
                String::new()
            },
            is_local: options.is_local,
            is_disabled: false,
            is_error: false,
            error_message: None,
            updated_at: Utc::now(),
        };

        let mut commands = Vec::with_capacity(manifest.commands.len());
        for command in &manifest.commands {
            commands.push(ExtensionCommandRow::from_manifest(&extension_id, command)?);
        }

        let mut configs = Vec::new();
        if !manifest.config.is_empty() {
            configs.push(ExtensionConfigRow {
                config_id: extension_id.clone(),
                extension_id: extension_id.clone(),
                schema: serde_json::to_string(&manifest.config)?,
                value: None,
            });
        }
        for command in &manifest.commands {
            if !command.config.is_empty() {
                configs.push(ExtensionConfigRow {
                    config_id: format!("{extension_id}:{}", command.name),
                    extension_id: extension_id.clone(),
                    schema: serde_json::to_string(&command.config)?,
                    value: None,
                });
            }
        }

        self.db.with_tx(|tx| {
            db::insert_extension(tx, &extension)?;
            for row in &commands {
                db::upsert_command(tx, row)?;
            }
            for row in &configs {
                db::upsert_config(tx, row)?;
            }
            Ok(())
        })?;

        info!(
            extension_id,
            version = %extension.version,
            is_local = options.is_local,
            "imported extension"
        );
        self.bus.emit(vec![StaleQuery::ExtensionList]);

        Ok(Some(ExtensionWithCommands {
            extension,
            commands,
        }))
    }

    /// Download, unpack and register a store extension
    ///
    /// Concurrency-guarded per extension id: a second concurrent call for
    /// the same id returns `Ok(None)` immediately. `has_validated` skips the
    /// existing-row check when the caller already confirmed non-existence.
    pub async fn install_extension(
        &self,
        extension_id: &str,
        has_validated: bool,
    ) -> Result<Option<ExtensionWithCommands>> {
        let Some(_guard) = InstallGuard::acquire(&self.installing, extension_id) else {
            debug!(extension_id, "install already in flight");
            return Ok(None);
        };

        if !has_validated {
            let exists = self
                .db
                .with_conn(|conn| db::get_extension(conn, extension_id))?
                .is_some();
            if exists {
                debug!(extension_id, "extension already installed");
                return Ok(None);
            }
        }

        let result = self.fetch_and_import(extension_id).await;
        if let Err(err) = &result {
            error!(
                service = "extension-loader",
                operation = "install",
                extension_id,
                error = %err,
                "install failed"
            );
        }
        result
    }

    async fn fetch_and_import(&self, extension_id: &str) -> Result<Option<ExtensionWithCommands>> {
        let url = self.registry.get_download_file_url(extension_id).await?;
        let bytes = self.registry.download_file(&url).await?;

        self.root.ensure_base_dirs()?;
        let dest = self.root.managed_dir(extension_id);
        unpack::extract_zip(&bytes, &dest)?;

        self.import_extension(
            &dest.join(unpack::MANIFEST_FILE_NAME),
            ImportOptions::managed(extension_id),
        )
    }

    /// Re-read a local extension's on-disk manifest and apply any update.
    /// Returns whether anything changed; `Ok(false)` for non-local rows.
    pub fn reload_extension(&self, extension_id: &str) -> Result<bool> {
        let Some(row) = self
            .db
            .with_conn(|conn| db::get_extension(conn, extension_id))?
        else {
            return Err(Error::not_found("extension"));
        };
        if !row.is_local {
            debug!(extension_id, "reload skipped, extension is not local");
            return Ok(false);
        }

        let changed = self.updater.update_local_extension(&row)?;
        if changed {
            self.bus.emit(vec![
                StaleQuery::ExtensionList,
                StaleQuery::Extension(Selector::id(extension_id)),
                StaleQuery::Commands(Selector::id(extension_id)),
                StaleQuery::Configs(Selector::id(extension_id)),
            ]);
        }
        Ok(changed)
    }

    /// Remove an extension: host hooks, then the DB row (commands and
    /// configs cascade), then the managed directory for store extensions.
    /// Local user-owned directories are never deleted.
    pub async fn uninstall_extension(&self, extension_id: &str) -> Result<()> {
        let Some(loaded) = self
            .db
            .with_conn(|conn| db::get_extension_with_commands(conn, extension_id))?
        else {
            return Err(Error::not_found("extension"));
        };

        let command_ids: Vec<String> = loaded
            .commands
            .iter()
            .map(|command| command.id.clone())
            .collect();
        if let Err(err) = self
            .hooks
            .unregister_shortcuts(extension_id, &command_ids)
            .await
        {
            warn!(extension_id, error = %err, "shortcut unregistration failed");
        }
        if let Err(err) = self.hooks.delete_private_data(extension_id).await {
            warn!(extension_id, error = %err, "private data deletion failed");
        }

        self.db.with_tx(|tx| {
            db::delete_extension(tx, extension_id)?;
            Ok(())
        })?;

        info!(extension_id, "uninstalled extension");
        self.bus.emit(vec![
            StaleQuery::ExtensionList,
            StaleQuery::Extension(Selector::id(extension_id)),
            StaleQuery::Commands(Selector::id(extension_id)),
            StaleQuery::Configs(Selector::id(extension_id)),
        ]);

        if !loaded.extension.is_local {
            let managed = self.root.managed_dir(extension_id);
            match std::fs::remove_dir_all(&managed) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}
