//! Bundle unpacking
//!
//! A bundle is a zip archive carrying a top-level `manifest.json`. Extraction
//! always empties the destination first, so a failed previous install never
//! leaves stale files shadowing the new bundle, and finishes by synthesizing a
//! `package.json` module marker for the runtime that later loads the bundle.
//!
//! Filesystem mutation here is not covered by any DB transaction; callers
//! sequence it before the transaction that makes the row visible (installs)
//! or after all DB writes are staged (updates, via [`replace_dir_contents`]).

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use altdot_core::{Error, Result};
use tracing::debug;
use zip::ZipArchive;

/// Fixed `name` written into the synthesized module marker
pub const MODULE_MARKER_NAME: &str = "altdot-extension";

/// File name of the manifest every bundle must carry
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Extract a zip bundle into `destination`, replacing any prior contents
///
/// Fails before touching the destination if the archive has no `manifest.json`
/// file entry. Returns the destination path on success.
pub fn extract_zip(bytes: &[u8], destination: &Path) -> Result<PathBuf> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(Error::archive)?;

    let has_manifest = (0..archive.len()).any(|index| {
        archive
            .by_index(index)
            .map(|entry| entry.is_file() && entry.name() == MANIFEST_FILE_NAME)
            .unwrap_or(false)
    });
    if !has_manifest {
        return Err(Error::validation("manifest file not found"));
    }

    empty_dir(destination)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(Error::archive)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            // Entry escapes the destination; never write it
            debug!(entry = entry.name(), "skipping unsafe zip entry");
            continue;
        };

        let out = destination.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out)?;
        io::copy(&mut entry, &mut out_file)?;
    }

    write_module_marker(destination)?;

    debug!(destination = %destination.display(), "extracted bundle");
    Ok(destination.to_path_buf())
}

/// Write the `package.json` marker so the bundle is treated as an ES module
fn write_module_marker(destination: &Path) -> Result<()> {
    let marker = serde_json::json!({
        "type": "module",
        "name": MODULE_MARKER_NAME,
    });
    fs::write(
        destination.join("package.json"),
        serde_json::to_vec_pretty(&marker)?,
    )?;
    Ok(())
}

/// Remove all prior contents of `path` and recreate it
pub fn empty_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Replace the contents of `live` with the contents of `staging`
///
/// The staging directory is consumed. Rename is attempted first; a recursive
/// copy covers staging and live dirs on different filesystems.
pub fn replace_dir_contents(live: &Path, staging: &Path) -> Result<()> {
    if !staging.is_dir() {
        return Err(Error::archive(format!(
            "staging directory missing: {}",
            staging.display()
        )));
    }

    if live.exists() {
        fs::remove_dir_all(live)?;
    }
    if let Some(parent) = live.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(staging, live) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir_recursive(staging, live)?;
            fs::remove_dir_all(staging)?;
            Ok(())
        }
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
