//! Extension manifest model and extraction
//!
//! Every extension bundle carries a `manifest.json` describing the extension
//! and its commands. Extraction runs a short-circuiting pipeline:
//!
//! 1. file existence (path variant only)
//! 2. JSON parse
//! 3. shape validation against the typed model
//! 4. semver validity of the `version` field
//!
//! No step panics or returns an untyped error; callers record failures on the
//! extension row instead of crashing.

use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of manifest extraction; the error side is always renderable verbatim
pub type ManifestResult = std::result::Result<ExtensionManifest, ManifestError>;

/// Typed manifest extraction failures, in pipeline order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("manifest not found")]
    NotFound,

    #[error("couldn't parse manifest, check the JSON format")]
    Parse,

    #[error("{0}")]
    Schema(String),

    #[error("invalid version")]
    InvalidVersion,
}

/// A parsed and validated extension manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    pub name: String,
    pub title: String,
    pub description: String,
    pub version: String,
    pub icon: String,
    pub author: String,
    pub commands: Vec<ManifestCommand>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<ConfigSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Credential providers the extension integrates with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<String>,
}

/// A single command declared by a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCommand {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<CommandArgument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<ConfigSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<String>>,
}

/// How a command is rendered/executed by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Action,
    View,
    Script,
}

/// A launch argument a command asks the user for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub argument_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// A configuration field declared by the manifest
///
/// The schema is manifest-owned; the user-entered value is persisted
/// separately and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

impl ExtensionManifest {
    /// Parsed semver of the `version` field
    ///
    /// Extraction already validated the string, so this only fails on a
    /// manifest constructed by hand.
    pub fn semver(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }

    /// All config ids this manifest can describe: the extension-level id plus
    /// one `<id>:<command>` per command that declares config fields
    pub fn config_ids(&self, extension_id: &str) -> Vec<String> {
        let mut ids = Vec::new();
        if !self.config.is_empty() {
            ids.push(extension_id.to_string());
        }
        for command in &self.commands {
            if !command.config.is_empty() {
                ids.push(format!("{}:{}", extension_id, command.name));
            }
        }
        ids
    }
}

/// Parse and validate a manifest from raw JSON text
pub fn extract_manifest(json_text: &str) -> ManifestResult {
    let value: serde_json::Value =
        serde_json::from_str(json_text).map_err(|_| ManifestError::Parse)?;

    let manifest: ExtensionManifest =
        serde_json::from_value(value).map_err(|err| ManifestError::Schema(err.to_string()))?;

    if Version::parse(&manifest.version).is_err() {
        return Err(ManifestError::InvalidVersion);
    }

    Ok(manifest)
}

/// Parse and validate a manifest file on disk
pub fn extract_manifest_from_path(path: &Path) -> ManifestResult {
    if !path.is_file() {
        return Err(ManifestError::NotFound);
    }

    let json_text = std::fs::read_to_string(path).map_err(|_| ManifestError::NotFound)?;
    extract_manifest(&json_text)
}
