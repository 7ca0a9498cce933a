//! # altdot-core
//!
//! Core library for the AltDot extension platform providing:
//! - Typed extension manifest model
//! - Manifest extraction and validation
//! - Shared error types for the lifecycle crates

pub mod error;
pub mod manifest;

pub use error::{Error, Result};
pub use manifest::{
    extract_manifest, extract_manifest_from_path, CommandArgument, CommandType, ConfigSchema,
    ExtensionManifest, ManifestCommand, ManifestError, ManifestResult,
};
