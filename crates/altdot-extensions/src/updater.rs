//! Scheduled extension updates
//!
//! `run_update_check` is fired once on application-ready (fire-and-forget so
//! it never blocks startup) and gated to one pass per wall-clock day. It
//! partitions installed extensions into local and store buckets, produces an
//! [`UpdatePayload`] per extension that needs work, and applies each bucket
//! inside a single DB transaction. Any single extension's failure is logged
//! and excluded from the pass; siblings are unaffected.

use std::path::Path;
use std::sync::Arc;

use altdot_core::{extract_manifest_from_path, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::applier::{ExtensionPatch, UpdatePayload, UpdaterApplier};
use crate::config::ExtensionRoot;
use crate::db::{self, Database, ExtensionRow, BUILT_IN_EXTENSION_ID, LAST_UPDATE_CHECK_KEY};
use crate::events::{ChangeBus, Selector, StaleQuery};
use crate::registry::{RegistryClient, UpdateQuery};
use crate::unpack;

/// Periodic/triggered update process
pub struct ExtensionUpdater {
    db: Arc<Database>,
    registry: Arc<dyn RegistryClient>,
    root: ExtensionRoot,
    bus: ChangeBus,
}

impl ExtensionUpdater {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<dyn RegistryClient>,
        root: ExtensionRoot,
        bus: ChangeBus,
    ) -> Self {
        Self {
            db,
            registry,
            root,
            bus,
        }
    }

    /// Run one scheduled update pass; no-op if a pass already ran today.
    /// Returns whether anything changed.
    pub async fn run_update_check(&self) -> Result<bool> {
        let today = Utc::now().date_naive();
        if self.last_check_date()? == Some(today) {
            debug!("update check already ran today");
            return Ok(false);
        }

        let extensions = self.db.with_conn(db::list_extensions)?;
        let (local, store): (Vec<_>, Vec<_>) = extensions
            .into_iter()
            .filter(|row| row.id != BUILT_IN_EXTENSION_ID)
            .partition(|row| row.is_local);
        info!(
            local = local.len(),
            store = store.len(),
            "running extension update check"
        );

        let local_payloads: Vec<UpdatePayload> = local
            .iter()
            .filter_map(|row| self.produce_local_payload(row))
            .collect();
        let mut changed = self.apply_payloads(&local_payloads)?;

        let store_payloads = self.produce_store_payloads(&store).await;
        changed |= self.apply_payloads(&store_payloads)?;

        self.db
            .with_tx(|tx| db::set_app_state(tx, LAST_UPDATE_CHECK_KEY, &today.to_string()))?;

        if changed {
            self.bus.emit(vec![
                StaleQuery::ExtensionList,
                StaleQuery::Extension(Selector::All),
                StaleQuery::Commands(Selector::All),
                StaleQuery::Configs(Selector::All),
            ]);
        }
        Ok(changed)
    }

    /// Single-extension update path used by manual reload; bypasses the
    /// daily gate but goes through the same payload/apply pipeline
    pub fn update_local_extension(&self, row: &ExtensionRow) -> Result<bool> {
        let Some(payload) = self.produce_local_payload(row) else {
            return Ok(false);
        };
        self.apply_payloads(std::slice::from_ref(&payload))?;
        Ok(true)
    }

    /// Re-extract a local extension's on-disk manifest and decide what to do
    ///
    /// Extraction failure degrades the row to errored instead of removing it.
    /// The update gate is `mtime > updated_at AND version differs` — a
    /// heuristic (a content hash would catch edits that skip the version
    /// bump), kept because it detects "nothing to do" without reading rows.
    pub fn produce_local_payload(&self, row: &ExtensionRow) -> Option<UpdatePayload> {
        let manifest_path = Path::new(&row.path).join(unpack::MANIFEST_FILE_NAME);

        let manifest = match extract_manifest_from_path(&manifest_path) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(extension_id = %row.id, error = %err, "local manifest failed extraction");
                return Some(UpdatePayload::Error {
                    extension_id: row.id.clone(),
                    patch: ExtensionPatch {
                        error_message: Some(err.to_string()),
                    },
                });
            }
        };

        let modified_at: DateTime<Utc> = match std::fs::metadata(&manifest_path)
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified.into(),
            Err(err) => {
                warn!(extension_id = %row.id, error = %err, "couldn't stat local manifest");
                return None;
            }
        };

        if modified_at > row.updated_at && manifest.version != row.version {
            debug!(extension_id = %row.id, from = %row.version, to = %manifest.version, "local update found");
            Some(UpdatePayload::Manifest {
                extension_id: row.id.clone(),
                manifest,
                staging_dir: None,
            })
        } else {
            None
        }
    }

    /// Batch-query the registry, then download and stage each flagged
    /// extension. Network and unpack failures are contained per extension.
    async fn produce_store_payloads(&self, rows: &[ExtensionRow]) -> Vec<UpdatePayload> {
        if rows.is_empty() {
            return Vec::new();
        }

        let queries: Vec<UpdateQuery> = rows
            .iter()
            .map(|row| UpdateQuery {
                id: row.id.clone(),
                version: row.version.clone(),
            })
            .collect();

        let hits = match self.registry.check_update(&queries).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "registry update check failed");
                return Vec::new();
            }
        };

        let mut payloads = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.stage_store_update(&hit.id, &hit.file_url).await {
                Ok(payload) => payloads.push(payload),
                Err(err) => {
                    warn!(extension_id = %hit.id, error = %err, "store update failed, skipping");
                }
            }
        }
        payloads
    }

    /// Download one archive into a staging directory and validate its manifest
    async fn stage_store_update(&self, extension_id: &str, file_url: &str) -> Result<UpdatePayload> {
        let bytes = self.registry.download_file(file_url).await?;

        let staging = self.root.staging_dir(extension_id);
        unpack::extract_zip(&bytes, &staging)?;

        let manifest = extract_manifest_from_path(&staging.join(unpack::MANIFEST_FILE_NAME))?;

        Ok(UpdatePayload::Manifest {
            extension_id: extension_id.to_string(),
            manifest,
            staging_dir: Some(staging),
        })
    }

    /// Apply one bucket of payloads inside a single transaction
    ///
    /// File replacement happens as the last step of each payload, so a
    /// rollback leaves the old on-disk files authoritative.
    pub fn apply_payloads(&self, payloads: &[UpdatePayload]) -> Result<bool> {
        if payloads.is_empty() {
            return Ok(false);
        }

        self.db.with_tx(|tx| {
            let applier = UpdaterApplier::new(tx, &self.root);
            for payload in payloads {
                applier.apply(payload)?;
            }
            Ok(())
        })?;
        Ok(true)
    }

    fn last_check_date(&self) -> Result<Option<NaiveDate>> {
        let stored = self
            .db
            .with_conn(|conn| db::get_app_state(conn, LAST_UPDATE_CHECK_KEY))?;
        Ok(stored.and_then(|value| value.parse::<NaiveDate>().ok()))
    }
}
