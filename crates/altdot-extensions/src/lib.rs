//! # altdot-extensions
//!
//! Extension package lifecycle management for the AltDot platform:
//! - Install, import, reload and uninstall of extension bundles
//! - Zip unpacking with module marker synthesis
//! - SQLite-backed records reconciled against manifests
//! - Scheduled update checks against the store registry
//! - On-disk path resolution with a read-through cache
//! - Change notifications for query-layer consumers

pub mod applier;
pub mod config;
pub mod db;
pub mod events;
pub mod loader;
pub mod paths;
pub mod registry;
pub mod unpack;
pub mod updater;

pub use applier::{ExtensionPatch, UpdatePayload, UpdaterApplier};
pub use config::{ExtensionRoot, EXT_HOME_ENV};
pub use db::{
    Database, ExtensionCommandRow, ExtensionConfigRow, ExtensionCredentialRow, ExtensionRow,
    ExtensionWithCommands, BUILT_IN_EXTENSION_ID,
};
pub use events::{ChangeBus, Selector, StaleQuery};
pub use loader::{derive_extension_id, ExtensionLoader, HostHooks, ImportOptions, NoopHostHooks};
pub use paths::{PathKind, PathResolver};
pub use registry::{HttpRegistryClient, RegistryClient, UpdateHit, UpdateQuery};
pub use unpack::{extract_zip, MANIFEST_FILE_NAME, MODULE_MARKER_NAME};
pub use updater::ExtensionUpdater;
