//! Fixture builders and the shared test harness

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use altdot_extensions::{ChangeBus, Database, ExtensionLoader, ExtensionRoot};
use tempfile::TempDir;
use zip::write::FileOptions;

use super::mocks::{MockRegistry, RecordingHooks};

/// Manifest JSON with simple action commands and no config blocks
pub fn manifest_json(version: &str, commands: &[&str]) -> String {
    let commands: Vec<(&str, bool)> = commands.iter().map(|name| (*name, false)).collect();
    manifest_json_with_config(version, &commands)
}

/// Manifest JSON where each `(name, has_config)` pair controls whether the
/// command declares a config schema
pub fn manifest_json_with_config(version: &str, commands: &[(&str, bool)]) -> String {
    let command_blocks: Vec<String> = commands
        .iter()
        .map(|(name, has_config)| {
            if *has_config {
                format!(
                    r#"{{ "name": "{name}", "title": "{name}", "type": "action",
                         "config": [ {{ "name": "endpoint", "type": "input:text" }} ] }}"#
                )
            } else {
                format!(r#"{{ "name": "{name}", "title": "{name}", "type": "action" }}"#)
            }
        })
        .collect();

    format!(
        r#"{{
            "name": "demo",
            "title": "Demo Extension",
            "description": "integration fixture",
            "version": "{version}",
            "icon": "icon.png",
            "author": "acme",
            "commands": [ {} ]
        }}"#,
        command_blocks.join(", ")
    )
}

/// Write a local bundle directory; returns the manifest path
pub fn write_local_bundle(dir: &Path, manifest: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create bundle dir");
    let manifest_path = dir.join("manifest.json");
    std::fs::write(&manifest_path, manifest).expect("write manifest");
    manifest_path
}

/// Build an in-memory zip archive from `(entry name, contents)` pairs
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        for (name, contents) in entries {
            writer
                .start_file(*name, FileOptions::default())
                .expect("start zip entry");
            writer
                .write_all(contents.as_bytes())
                .expect("write zip entry");
        }
        writer.finish().expect("finish zip");
    }
    buffer.into_inner()
}

/// Bundle zip containing a manifest plus an `index.js` stub
pub fn build_bundle_zip(manifest: &str) -> Vec<u8> {
    build_zip(&[("manifest.json", manifest), ("index.js", "export {};")])
}

/// Everything a lifecycle test needs, wired against temp storage
pub struct TestHarness {
    pub tmp: TempDir,
    pub db: Arc<Database>,
    pub root: ExtensionRoot,
    pub bus: ChangeBus,
    pub registry: Arc<MockRegistry>,
    pub hooks: Arc<RecordingHooks>,
    pub loader: Arc<ExtensionLoader>,
}

impl TestHarness {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::open_in_memory().expect("open db"));
        let root = ExtensionRoot::new(tmp.path().join("extensions"));
        let bus = ChangeBus::default();
        let registry = Arc::new(MockRegistry::new());
        let hooks = Arc::new(RecordingHooks::new());
        let loader = Arc::new(ExtensionLoader::new(
            Arc::clone(&db),
            root.clone(),
            Arc::clone(&registry) as Arc<dyn altdot_extensions::RegistryClient>,
            Arc::clone(&hooks) as Arc<dyn altdot_extensions::HostHooks>,
            bus.clone(),
        ));
        Self {
            tmp,
            db,
            root,
            bus,
            registry,
            hooks,
            loader,
        }
    }

    /// Path for a local bundle under the temp dir, outside the managed root
    pub fn bundle_dir(&self, name: &str) -> PathBuf {
        self.tmp.path().join("bundles").join(name)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
